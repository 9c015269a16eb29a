//! Benchmark options: raw input, clamping and derived values.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{BenchError, Result};

pub const TIME_LEN_MIN: u64 = 10;
pub const TIME_LEN_MAX: u64 = 600;
pub const KEY_SIZE_MIN: usize = 16;
pub const KEY_SIZE_MAX: usize = 100;
pub const VALUE_SIZE_MAX: usize = 4 * 1024 * 1024;
pub const CLIENT_NUM_MAX: usize = 10_000;
pub const TIME_COST_MIN_MAX: u64 = 1_000_000;
pub const READ_POPULATION_MAX: usize = 100_000;

/// Maximum number of latency bucket boundaries
pub const MAX_LATENCY_BUCKETS: usize = 20;

/// Runs up to this many seconds are sampled every second
const STEP_SAMPLES: u64 = 40;

/// Kind of workload a single benchmark run drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BenchType {
    RandWrite,
    RandRead,
    SeqWrite,
    SeqRead,
}

impl BenchType {
    /// All types in the order they are executed
    pub const CANONICAL: [BenchType; 4] = [
        BenchType::RandWrite,
        BenchType::RandRead,
        BenchType::SeqWrite,
        BenchType::SeqRead,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BenchType::RandWrite => "rand-write",
            BenchType::RandRead => "rand-read",
            BenchType::SeqWrite => "seq-write",
            BenchType::SeqRead => "seq-read",
        }
    }

    fn bit(self) -> u8 {
        match self {
            BenchType::RandWrite => 1 << 0,
            BenchType::RandRead => 1 << 1,
            BenchType::SeqWrite => 1 << 2,
            BenchType::SeqRead => 1 << 3,
        }
    }

    pub fn is_write(self) -> bool {
        matches!(self, BenchType::RandWrite | BenchType::SeqWrite)
    }

    pub fn is_read(self) -> bool {
        !self.is_write()
    }

    pub fn is_sequential(self) -> bool {
        matches!(self, BenchType::SeqWrite | BenchType::SeqRead)
    }
}

impl std::fmt::Display for BenchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for BenchType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "rand-write" => Ok(BenchType::RandWrite),
            "rand-read" => Ok(BenchType::RandRead),
            "seq-write" => Ok(BenchType::SeqWrite),
            "seq-read" => Ok(BenchType::SeqRead),
            _ => Err(format!("Unknown bench type: {}", s)),
        }
    }
}

/// Selected benchmark types: a bitmask plus first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BenchTypeSet {
    mask: u8,
    order: Vec<BenchType>,
}

impl BenchTypeSet {
    /// Parse a comma-separated list; unknown names are skipped
    pub fn parse(s: &str) -> Self {
        let mut set = Self::default();
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match name.parse::<BenchType>() {
                Ok(typ) => {
                    set.insert(typ);
                }
                Err(e) => tracing::warn!("{}, ignored", e),
            }
        }
        set
    }

    /// Add a type, returning false if it was already selected
    pub fn insert(&mut self, typ: BenchType) -> bool {
        if self.contains(typ) {
            return false;
        }
        self.mask |= typ.bit();
        self.order.push(typ);
        true
    }

    pub fn contains(&self, typ: BenchType) -> bool {
        self.mask & typ.bit() == typ.bit()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Types in the order they were selected
    pub fn iter(&self) -> impl Iterator<Item = BenchType> + '_ {
        self.order.iter().copied()
    }

    /// Selected types in execution order
    pub fn canonical(&self) -> Vec<BenchType> {
        BenchType::CANONICAL
            .into_iter()
            .filter(|t| self.contains(*t))
            .collect()
    }
}

/// Unvalidated benchmark settings as supplied by the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOptions {
    /// Comma-separated benchmark type names
    pub bench_types: String,
    /// Run length per benchmark type in seconds
    pub time_len: u64,
    pub key_size: usize,
    pub value_size: usize,
    /// Concurrent operations in flight
    pub client_num: usize,
    /// Lower latency bound in microseconds
    pub time_cost_min: u64,
    /// Upper latency bound in microseconds
    pub time_cost_max: u64,
    /// Distinct keys written before a read benchmark
    pub read_population: usize,
    pub chart_output: String,
    pub chart_title: String,
    pub chart_legend: String,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            bench_types: "rand-write,rand-read,seq-write,seq-read".to_string(),
            time_len: 10,
            key_size: 40,
            value_size: 1024,
            client_num: 1,
            time_cost_min: 10,
            time_cost_max: 100_000,
            read_population: READ_POPULATION_MAX,
            chart_output: "bench".to_string(),
            chart_title: String::new(),
            chart_legend: String::new(),
        }
    }
}

/// Resolved options, fixed for the whole benchmark sequence
#[derive(Debug, Clone)]
pub struct BenchmarkOptions {
    pub types: BenchTypeSet,
    /// Run length in seconds, a multiple of `time_step`
    pub time_len: u64,
    /// Sampling step in seconds
    pub time_step: u64,
    pub key_size: usize,
    pub value_size: usize,
    pub client_num: usize,
    pub time_cost_min: u64,
    pub time_cost_max: u64,
    /// Ascending bucket boundaries in microseconds, last == `time_cost_max`
    pub time_cost_ranges: Arc<[u64]>,
    pub read_population: usize,
    pub chart_output: String,
    pub chart_title: String,
    pub chart_legend: String,
}

impl BenchmarkOptions {
    /// Clamp raw settings into range and derive step and bucket boundaries
    pub fn resolve(raw: &RawOptions) -> Result<Self> {
        let types = BenchTypeSet::parse(&raw.bench_types);
        if types.is_empty() {
            return Err(BenchError::Config("no --bench-types found".to_string()));
        }

        let time_cost_min = raw.time_cost_min.clamp(1, TIME_COST_MIN_MAX);
        let time_cost_max = raw.time_cost_max.max(time_cost_min * 10);
        if time_cost_max != raw.time_cost_max {
            tracing::debug!(
                "time_cost_max raised from {} to {}",
                raw.time_cost_max,
                time_cost_max
            );
        }

        let (time_len, time_step) = sampling_step(raw.time_len.clamp(TIME_LEN_MIN, TIME_LEN_MAX));

        Ok(Self {
            types,
            time_len,
            time_step,
            key_size: raw.key_size.clamp(KEY_SIZE_MIN, KEY_SIZE_MAX),
            value_size: raw.value_size.clamp(1, VALUE_SIZE_MAX),
            client_num: raw.client_num.clamp(1, CLIENT_NUM_MAX),
            time_cost_min,
            time_cost_max,
            time_cost_ranges: latency_boundaries(time_cost_min, time_cost_max).into(),
            read_population: raw.read_population.clamp(1, READ_POPULATION_MAX),
            chart_output: raw.chart_output.trim().to_string(),
            chart_title: raw.chart_title.clone(),
            chart_legend: raw.chart_legend.clone(),
        })
    }

    /// Short tag identifying the run parameters, used in output file names
    pub fn args_name(&self) -> String {
        format!(
            "t{}_tc{}-{}",
            self.time_len, self.time_cost_min, self.time_cost_max
        )
    }
}

/// Derive the sampling step and round the run length up to a multiple of it
pub fn sampling_step(time_len: u64) -> (u64, u64) {
    let step = if time_len > STEP_SAMPLES {
        time_len / STEP_SAMPLES
    } else {
        1
    };

    match time_len % step {
        0 => (time_len, step),
        rem => (time_len + step - rem, step),
    }
}

/// Power-of-two latency bucket boundaries between `min` and `max`.
///
/// Starts at `max(min, (max - min) >> 20)` and doubles; the final boundary is
/// always `max` and there are never more than [`MAX_LATENCY_BUCKETS`].
pub fn latency_boundaries(min: u64, max: u64) -> Vec<u64> {
    let mut ranges = Vec::with_capacity(MAX_LATENCY_BUCKETS);
    let mut value = ((max - min) >> 20).max(min);

    while ranges.len() < MAX_LATENCY_BUCKETS - 1 && value < max {
        ranges.push(value);
        value = value.saturating_mul(2);
    }
    ranges.push(max);

    ranges
}
