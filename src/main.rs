use anyhow::Result;
use std::sync::Arc;

use kvbench::backend::MemoryBackend;
use kvbench::bench::{
    build_runtime, BenchmarkOptions, JsonFileSink, KeyValueBench, NullSink, ResultSink,
};
use kvbench::config::Config;
use kvbench::host::CpuLoadProbe;

fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    let options = BenchmarkOptions::resolve(&config.raw_options)?;

    // Every in-flight backend call holds a blocking thread
    let runtime = build_runtime(options.client_num)?;
    runtime.block_on(run(config, options))
}

async fn run(config: Config, options: BenchmarkOptions) -> Result<()> {
    tracing::info!(
        "kvbench starting: {} types, {}s each, {} clients, key-size {}, value-size {}",
        options.types.len(),
        options.time_len,
        options.client_num,
        options.key_size,
        options.value_size
    );
    tracing::debug!("Latency buckets (us): {:?}", options.time_cost_ranges);

    let sink: Box<dyn ResultSink> = if options.chart_output.is_empty() {
        tracing::info!("Result persistence disabled");
        Box::new(NullSink)
    } else {
        let sink = JsonFileSink::for_options(&options);
        tracing::info!("Saving results to {}", sink.path().display());
        Box::new(sink)
    };

    let backend = Arc::new(MemoryBackend::with_config(config.backend.clone()));
    let probe = CpuLoadProbe::new(config.idle_sample_window);

    let mut bench = KeyValueBench::new(options, backend, probe, sink)
        .with_idle_threshold(config.idle_threshold);

    let report = bench.run().await?;

    if config.json_output {
        println!("{}", report.to_json());
    } else {
        report.print_table();
    }

    Ok(())
}
