//! Report generation for benchmark results.

use super::options::BenchType;
use super::status::RunSummary;
use serde::{Deserialize, Serialize};

/// Complete benchmark report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchReport {
    /// One row per executed type, in execution order
    pub results: Vec<BenchResultRow>,
    pub client_num: usize,
    pub key_size: usize,
    pub value_size: usize,
}

/// Results for a single benchmark type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchResultRow {
    pub name: String,
    pub bench_type: BenchType,
    pub ok: u64,
    pub err: u64,
    pub success_rate: f64,
    pub ops_per_second: f64,
    pub latency_mean_ms: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub elapsed_secs: f64,
}

impl BenchResultRow {
    pub fn from_summary(name: String, bench_type: BenchType, summary: &RunSummary) -> Self {
        Self {
            name,
            bench_type,
            ok: summary.ok,
            err: summary.err,
            success_rate: summary.success_rate(),
            ops_per_second: summary.throughput,
            latency_mean_ms: summary.latency_mean_us / 1000.0,
            latency_p50_ms: summary.latency_p50_us as f64 / 1000.0,
            latency_p95_ms: summary.latency_p95_us as f64 / 1000.0,
            latency_p99_ms: summary.latency_p99_us as f64 / 1000.0,
            elapsed_secs: summary.elapsed_micros as f64 / 1e6,
        }
    }
}

impl BenchReport {
    pub fn new(client_num: usize, key_size: usize, value_size: usize) -> Self {
        Self {
            results: Vec::new(),
            client_num,
            key_size,
            value_size,
        }
    }

    pub fn push(&mut self, row: BenchResultRow) {
        self.results.push(row);
    }

    /// Row with the highest throughput
    pub fn fastest(&self) -> Option<&BenchResultRow> {
        self.results.iter().max_by(|a, b| {
            a.ops_per_second
                .partial_cmp(&b.ops_per_second)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// Print the report as an ASCII table
    pub fn print_table(&self) {
        println!();
        println!("╔══════════════════════════════════════════════════════════════════════════════════════════════════════╗");
        println!(
            "║ {:<100} ║",
            format!(
                "KVBENCH RESULTS  (clients {}, key-size {}, value-size {})",
                self.client_num, self.key_size, self.value_size
            )
        );
        println!("╚══════════════════════════════════════════════════════════════════════════════════════════════════════╝");
        println!();
        println!("┌──────────────────────────────┬────────────┬──────────┬──────────┬──────────┬──────────┬──────────┬──────────┐");
        println!("│ Dataset                      │   OPS/s    │ mean(ms) │  p50(ms) │  p95(ms) │  p99(ms) │ Success% │ Time(s)  │");
        println!("├──────────────────────────────┼────────────┼──────────┼──────────┼──────────┼──────────┼──────────┼──────────┤");

        for row in &self.results {
            println!(
                "│ {:<28} │ {:>10.1} │ {:>8.3} │ {:>8.3} │ {:>8.3} │ {:>8.3} │ {:>7.2}% │ {:>8.2} │",
                row.name,
                row.ops_per_second,
                row.latency_mean_ms,
                row.latency_p50_ms,
                row.latency_p95_ms,
                row.latency_p99_ms,
                row.success_rate,
                row.elapsed_secs
            );
        }

        println!("└──────────────────────────────┴────────────┴──────────┴──────────┴──────────┴──────────┴──────────┴──────────┘");
        println!();

        if let Some(best) = self.fastest() {
            println!(
                "Fastest: {} at {:.1} ops/s ({} ok, {} err)",
                best.name, best.ops_per_second, best.ok, best.err
            );
            println!();
        }
    }

    /// Export the report as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
