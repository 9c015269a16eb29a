//! Storage backend capability and a reference in-memory implementation.

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a single backend write or read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpStatus {
    Ok,
    Err,
}

impl OpStatus {
    pub fn is_ok(self) -> bool {
        self == OpStatus::Ok
    }
}

/// The three operations the engine needs from a key-value store.
///
/// Implementations must be safe for concurrent use: a single handle is
/// shared by every in-flight operation of a run. Calls are blocking and run
/// on the runtime's blocking pool, one thread per in-flight call.
pub trait KvBackend: Send + Sync + 'static {
    /// Store `value` under `key`
    fn write(&self, key: &[u8], value: &[u8]) -> OpStatus;

    /// Look up `key`
    fn read(&self, key: &[u8]) -> OpStatus;

    /// Drop all state left behind by a previous run
    fn clean(&self) -> anyhow::Result<()>;
}

/// Behaviour knobs for [`MemoryBackend`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryBackendConfig {
    /// Simulated latency added to every operation, in microseconds
    pub latency_us: u64,
    /// Probability (0.0 to 1.0) that an operation reports failure
    pub error_rate: f64,
}

/// Thread-safe in-memory store used for demo runs and tests
pub struct MemoryBackend {
    config: MemoryBackendConfig,
    data: DashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryBackend {
    /// Create a backend with no simulated latency or failures
    pub fn new() -> Self {
        Self::with_config(MemoryBackendConfig::default())
    }

    pub fn with_config(config: MemoryBackendConfig) -> Self {
        Self {
            config,
            data: DashMap::new(),
        }
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Apply the simulated latency and roll for a simulated failure
    fn simulate(&self) -> bool {
        if self.config.latency_us > 0 {
            std::thread::sleep(Duration::from_micros(self.config.latency_us));
        }

        self.config.error_rate > 0.0 && rand::thread_rng().gen::<f64>() < self.config.error_rate
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KvBackend for MemoryBackend {
    fn write(&self, key: &[u8], value: &[u8]) -> OpStatus {
        if self.simulate() {
            return OpStatus::Err;
        }
        self.data.insert(key.to_vec(), value.to_vec());
        OpStatus::Ok
    }

    fn read(&self, key: &[u8]) -> OpStatus {
        if self.simulate() {
            return OpStatus::Err;
        }
        if self.data.contains_key(key) {
            OpStatus::Ok
        } else {
            OpStatus::Err
        }
    }

    fn clean(&self) -> anyhow::Result<()> {
        tracing::debug!("Cleaning in-memory backend ({} keys)", self.data.len());
        self.data.clear();
        Ok(())
    }
}
