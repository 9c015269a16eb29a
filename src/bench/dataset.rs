//! Named result datasets and their persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::options::{BenchType, BenchmarkOptions};
use super::status::RunSummary;
use crate::error::Result;

pub const ATTR_THROUGHPUT: &str = "throughput";
pub const ATTR_LATENCY: &str = "latency";

/// Throughput at an elapsed time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputPoint {
    /// Elapsed seconds
    pub x: u64,
    /// Operations per second
    pub y: f64,
}

/// Share of operations in one latency bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyPoint {
    pub label: String,
    /// Percentage of all operations, 4 decimal places
    pub percent: f64,
}

/// Headline numbers of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub ok: u64,
    pub err: u64,
    pub elapsed_micros: u64,
    pub throughput: f64,
    pub latency_mean_us: f64,
    pub latency_p50_us: u64,
    pub latency_p95_us: u64,
    pub latency_p99_us: u64,
}

/// Results of one benchmark type, tagged for grouping by a renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub attrs: Vec<String>,
    pub bench_type: BenchType,
    pub client_num: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub throughput: Vec<ThroughputPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub latency: Vec<LatencyPoint>,
    pub summary: DatasetSummary,
    pub created: DateTime<Utc>,
}

impl Dataset {
    pub fn from_run(typ: BenchType, options: &BenchmarkOptions, summary: &RunSummary) -> Self {
        let name = dataset_name(options, typ);
        let total = summary.total();

        let throughput: Vec<ThroughputPoint> = summary
            .rates
            .iter()
            .map(|r| ThroughputPoint {
                x: r.elapsed_secs,
                y: r.rate,
            })
            .collect();

        let latency: Vec<LatencyPoint> = summary
            .histogram
            .iter()
            .map(|b| LatencyPoint {
                label: latency_label(b.boundary),
                percent: if total == 0 {
                    0.0
                } else {
                    round4(100.0 * b.count as f64 / total as f64)
                },
            })
            .collect();

        let mut attrs: Vec<String> = name.split('/').map(str::to_string).collect();
        if !throughput.is_empty() {
            attrs.push(ATTR_THROUGHPUT.to_string());
        }
        if !latency.is_empty() {
            attrs.push(ATTR_LATENCY.to_string());
        }

        Self {
            name,
            attrs,
            bench_type: typ,
            client_num: options.client_num,
            throughput,
            latency,
            summary: DatasetSummary {
                ok: summary.ok,
                err: summary.err,
                elapsed_micros: summary.elapsed_micros,
                throughput: summary.throughput,
                latency_mean_us: summary.latency_mean_us,
                latency_p50_us: summary.latency_p50_us,
                latency_p95_us: summary.latency_p95_us,
                latency_p99_us: summary.latency_p99_us,
            },
            created: Utc::now(),
        }
    }

    pub fn has_attr(&self, attr: &str) -> bool {
        self.attrs.iter().any(|a| a == attr)
    }
}

/// `[legend/]type[/client-xN]`
pub fn dataset_name(options: &BenchmarkOptions, typ: BenchType) -> String {
    let mut name = String::new();
    if !options.chart_legend.is_empty() {
        name.push_str(&options.chart_legend);
        name.push('/');
    }
    name.push_str(typ.name());
    if options.client_num > 1 {
        name.push_str(&format!("/client-x{}", options.client_num));
    }
    name
}

/// Human label for a bucket boundary given in microseconds
pub fn latency_label(us: u64) -> String {
    if us > 1_000_000 {
        format!("{} s", us / 1_000_000)
    } else if us > 1_000 {
        format!("{} ms", us / 1_000)
    } else {
        format!("{} us", us)
    }
}

fn round4(v: f64) -> f64 {
    (v * 1e4).round() / 1e4
}

/// All datasets collected so far, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataList {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<Dataset>,
}

impl DataList {
    /// Insert or replace the dataset with the same name
    pub fn set(&mut self, dataset: Dataset) {
        match self.items.iter_mut().find(|d| d.name == dataset.name) {
            Some(existing) => *existing = dataset,
            None => self.items.push(dataset),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.items.iter().find(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Persistence collaborator for benchmark results
pub trait ResultSink: Send {
    /// Results saved by earlier invocations, merged into by the orchestrator
    fn load(&mut self) -> Result<DataList> {
        Ok(DataList::default())
    }

    /// Save the complete result collection
    fn persist(&mut self, results: &DataList) -> Result<()>;
}

/// Discards results
#[derive(Debug, Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn persist(&mut self, _results: &DataList) -> Result<()> {
        Ok(())
    }
}

/// Keeps results in a pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Sink named after the chart output prefix and run parameters
    pub fn for_options(options: &BenchmarkOptions) -> Self {
        Self::new(format!("{}_{}.json", options.chart_output, options.args_name()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonFileSink {
    fn load(&mut self) -> Result<DataList> {
        match std::fs::read(&self.path) {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DataList::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&mut self, results: &DataList) -> Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");

        std::fs::write(&tmp, serde_json::to_vec_pretty(results)?)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(
            "Saved {} datasets to {}",
            results.len(),
            self.path.display()
        );
        Ok(())
    }
}
