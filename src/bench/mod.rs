//! Benchmark engine for key-value stores.
//!
//! This module provides:
//! - Option resolution and latency bucket derivation
//! - Write and read workload generation
//! - A bounded-concurrency load engine with periodic sampling
//! - Result aggregation, datasets and report generation

pub mod dataset;
pub mod options;
pub mod orchestrator;
pub mod report;
pub mod runner;
pub mod status;
pub mod workload;

pub use dataset::{DataList, Dataset, JsonFileSink, NullSink, ResultSink};
pub use options::{BenchType, BenchTypeSet, BenchmarkOptions, RawOptions};
pub use orchestrator::KeyValueBench;
pub use report::{BenchReport, BenchResultRow};
pub use runner::{build_runtime, BenchRun, RunPhase};
pub use status::{RunSummary, Status};
pub use workload::{Operation, OperationSource, WordPool};
