//! Runs every selected benchmark type in turn and collects the results.

use chrono::Local;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

use super::dataset::{DataList, Dataset, ResultSink};
use super::options::{BenchType, BenchmarkOptions};
use super::report::{BenchReport, BenchResultRow};
use super::runner::BenchRun;
use super::workload::WordPool;
use crate::backend::KvBackend;
use crate::error::{BenchError, Result};
use crate::host::{wait_for_idle, LoadProbe, DEFAULT_IDLE_THRESHOLD};

/// Drives a benchmark sequence against one backend
pub struct KeyValueBench<B, P> {
    options: Arc<BenchmarkOptions>,
    backend: Arc<B>,
    probe: P,
    /// `None` skips the host quiescence gate
    idle_threshold: Option<f32>,
    sink: Box<dyn ResultSink>,
    words: Arc<WordPool>,
    results: DataList,
}

impl<B: KvBackend, P: LoadProbe> KeyValueBench<B, P> {
    /// Create the orchestrator, picking up results the sink already holds.
    ///
    /// Previous results that cannot be loaded are logged and dropped.
    pub fn new(
        options: BenchmarkOptions,
        backend: Arc<B>,
        probe: P,
        mut sink: Box<dyn ResultSink>,
    ) -> Self {
        let mut results = sink.load().unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable previous results: {}", e);
            DataList::default()
        });
        if !results.is_empty() {
            tracing::info!("Loaded {} previous datasets", results.len());
        }
        if !options.chart_title.is_empty() {
            results.title = options.chart_title.clone();
        }
        results.description = format!(
            "key-size {}, value-size {}",
            options.key_size, options.value_size
        );

        Self {
            options: Arc::new(options),
            backend,
            probe,
            idle_threshold: Some(DEFAULT_IDLE_THRESHOLD),
            sink,
            words: Arc::new(WordPool::new(&mut StdRng::from_entropy())),
            results,
        }
    }

    pub fn with_idle_threshold(mut self, threshold: Option<f32>) -> Self {
        self.idle_threshold = threshold;
        self
    }

    pub fn options(&self) -> &BenchmarkOptions {
        &self.options
    }

    pub fn results(&self) -> &DataList {
        &self.results
    }

    /// Run all selected types in canonical order.
    ///
    /// Stops at the first backend or workload failure; datasets of finished
    /// types are already persisted by then. Failed saves do not stop the
    /// sequence.
    pub async fn run(&mut self) -> Result<BenchReport> {
        let mut report = BenchReport::new(
            self.options.client_num,
            self.options.key_size,
            self.options.value_size,
        );

        for typ in self.options.types.canonical() {
            report.push(self.run_one(typ).await?);
        }

        Ok(report)
    }

    /// Clean the backend, drive one run and persist its dataset
    pub async fn run_one(&mut self, typ: BenchType) -> Result<BenchResultRow> {
        if let Some(threshold) = self.idle_threshold {
            wait_for_idle(&mut self.probe, threshold).await;
        }

        let backend = self.backend.clone();
        tokio::task::spawn_blocking(move || backend.clean())
            .await?
            .map_err(BenchError::BackendSetup)?;

        let run = BenchRun::new(typ, self.options.clone());
        tracing::info!("Bench {} START with {} clients", typ, self.options.client_num);

        let summary = run.execute(self.backend.clone(), self.words.clone()).await?;
        let dataset = Dataset::from_run(typ, &self.options, &summary);

        tracing::info!(
            "Bench {} DONE at {}: {} ok, {} err, {:.1} ops/s",
            dataset.name,
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            summary.ok,
            summary.err,
            summary.throughput
        );

        let row = BenchResultRow::from_summary(dataset.name.clone(), typ, &summary);
        self.results.set(dataset);
        if let Err(e) = self.sink.persist(&self.results) {
            tracing::error!("Failed to save results for {}: {}", row.name, e);
        }

        Ok(row)
    }
}
