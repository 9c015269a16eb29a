use anyhow::Result;
use clap::Parser;
use std::time::Duration;

use crate::backend::MemoryBackendConfig;
use crate::bench::RawOptions;
use crate::host::{DEFAULT_IDLE_THRESHOLD, DEFAULT_SAMPLE_WINDOW};

/// kvbench - load generator and latency recorder for key-value stores
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Comma-separated benchmark types (rand-write, rand-read, seq-write, seq-read)
    #[arg(
        short = 'b',
        long,
        env = "KVBENCH_BENCH_TYPES",
        default_value = "rand-write,rand-read,seq-write,seq-read"
    )]
    pub bench_types: String,

    /// Run length per benchmark type in seconds
    #[arg(short = 't', long = "time", env = "KVBENCH_TIME", default_value = "10")]
    pub time_len: u64,

    /// Key size in bytes
    #[arg(short = 'k', long, env = "KVBENCH_KEY_SIZE", default_value = "40")]
    pub key_size: usize,

    /// Value size in bytes
    #[arg(short = 'v', long, env = "KVBENCH_VALUE_SIZE", default_value = "1024")]
    pub value_size: usize,

    /// Number of concurrent clients
    #[arg(short = 'c', long, env = "KVBENCH_CLIENT_NUM", default_value = "1")]
    pub client_num: usize,

    /// Lower latency bound in microseconds
    #[arg(long, env = "KVBENCH_TIME_COST_MIN", default_value = "10")]
    pub time_cost_min: u64,

    /// Upper latency bound in microseconds
    #[arg(long, env = "KVBENCH_TIME_COST_MAX", default_value = "100000")]
    pub time_cost_max: u64,

    /// Distinct keys written before a read benchmark
    #[arg(long, env = "KVBENCH_READ_POPULATION", default_value = "100000")]
    pub read_population: usize,

    /// Output file prefix for results (empty disables saving)
    #[arg(short = 'o', long, env = "KVBENCH_CHART_OUTPUT", default_value = "bench")]
    pub chart_output: String,

    /// Title stored with the results
    #[arg(long, env = "KVBENCH_CHART_TITLE", default_value = "")]
    pub chart_title: String,

    /// Legend prefixed to every dataset name
    #[arg(short = 'l', long, env = "KVBENCH_CHART_LEGEND", default_value = "")]
    pub chart_legend: String,

    /// Host CPU busy percentage below which a run may start
    #[arg(long, env = "KVBENCH_IDLE_THRESHOLD", default_value_t = DEFAULT_IDLE_THRESHOLD)]
    pub idle_threshold: f32,

    /// Seconds over which host CPU usage is sampled
    #[arg(long, env = "KVBENCH_IDLE_SAMPLE_SECS", default_value_t = DEFAULT_SAMPLE_WINDOW.as_secs())]
    pub idle_sample_secs: u64,

    /// Start runs without waiting for the host to settle
    #[arg(long, env = "KVBENCH_SKIP_IDLE_WAIT")]
    pub skip_idle_wait: bool,

    /// Simulated backend latency in microseconds
    #[arg(long, env = "KVBENCH_SIM_LATENCY_US", default_value = "0")]
    pub sim_latency_us: u64,

    /// Simulated backend failure probability (0.0 to 1.0)
    #[arg(long, env = "KVBENCH_SIM_ERROR_RATE", default_value = "0.0")]
    pub sim_error_rate: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Print the report as JSON instead of a table
    #[arg(long, env = "KVBENCH_JSON")]
    pub json: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Benchmark settings, resolved later
    pub raw_options: RawOptions,

    // Host quiescence
    pub idle_threshold: Option<f32>,
    pub idle_sample_window: Duration,

    // Demo backend
    pub backend: MemoryBackendConfig,

    // Output
    pub log_level: String,
    pub json_output: bool,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Ok(Self::from_args(CliArgs::parse()))
    }

    pub fn from_args(args: CliArgs) -> Self {
        Config {
            raw_options: RawOptions {
                bench_types: args.bench_types,
                time_len: args.time_len,
                key_size: args.key_size,
                value_size: args.value_size,
                client_num: args.client_num,
                time_cost_min: args.time_cost_min,
                time_cost_max: args.time_cost_max,
                read_population: args.read_population,
                chart_output: args.chart_output,
                chart_title: args.chart_title,
                chart_legend: args.chart_legend,
            },

            idle_threshold: (!args.skip_idle_wait).then_some(args.idle_threshold),
            idle_sample_window: Duration::from_secs(args.idle_sample_secs),

            backend: MemoryBackendConfig {
                latency_us: args.sim_latency_us,
                error_rate: args.sim_error_rate,
            },

            log_level: args.log_level,
            json_output: args.json,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.backend.error_rate) {
            anyhow::bail!(
                "KVBENCH_SIM_ERROR_RATE must be between 0 and 1, got {}",
                self.backend.error_rate
            );
        }

        if let Some(threshold) = self.idle_threshold {
            if !(threshold > 0.0 && threshold <= 100.0) {
                anyhow::bail!(
                    "KVBENCH_IDLE_THRESHOLD must be in (0, 100], got {}",
                    threshold
                );
            }
        }

        Ok(())
    }
}
