// Error handling module
// Defines the error taxonomy surfaced by the benchmark engine

use thiserror::Error;

/// Errors that abort a benchmark sequence.
///
/// A backend reporting a failed write or read is not an error here: it is
/// counted as `err` by the aggregator and the run carries on.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Invalid benchmark configuration or workload selection
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend reset before a run failed
    #[error("Backend setup failed: {0}")]
    BackendSetup(#[source] anyhow::Error),

    /// A runtime task could not be joined
    #[error("Task error: {0}")]
    Task(String),

    /// Result file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Result file could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokio::task::JoinError> for BenchError {
    fn from(err: tokio::task::JoinError) -> Self {
        BenchError::Task(err.to_string())
    }
}

/// Result type alias for benchmark operations
pub type Result<T> = std::result::Result<T, BenchError>;
