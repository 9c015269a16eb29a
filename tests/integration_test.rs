// Integration tests for kvbench
//
// These tests drive full benchmark runs against in-process backends and
// check the engine, aggregation and persistence end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kvbench::backend::{KvBackend, MemoryBackend, OpStatus};
use kvbench::bench::{
    build_runtime, BenchRun, BenchType, BenchmarkOptions, DataList, JsonFileSink, KeyValueBench,
    RawOptions, ResultSink, WordPool,
};
use kvbench::error::{BenchError, Result};
use kvbench::host::AlwaysIdle;
use rand::rngs::StdRng;
use rand::SeedableRng;

// ==================================================================================================
// Test Helpers
// ==================================================================================================

fn options(types: &str, client_num: usize) -> BenchmarkOptions {
    BenchmarkOptions::resolve(&RawOptions {
        bench_types: types.to_string(),
        client_num,
        value_size: 128,
        read_population: 1_000,
        chart_output: String::new(),
        ..Default::default()
    })
    .unwrap()
}

/// Shorten a run so the suite stays fast
fn short(mut opts: BenchmarkOptions) -> BenchmarkOptions {
    opts.time_len = 2;
    opts.time_step = 1;
    opts
}

fn words() -> Arc<WordPool> {
    Arc::new(WordPool::new(&mut StdRng::seed_from_u64(42)))
}

/// Accepts every operation without doing any work
struct InstantBackend;

impl KvBackend for InstantBackend {
    fn write(&self, _key: &[u8], _value: &[u8]) -> OpStatus {
        OpStatus::Ok
    }

    fn read(&self, _key: &[u8]) -> OpStatus {
        OpStatus::Ok
    }

    fn clean(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes succeed, every read fails
struct FailingReads;

impl KvBackend for FailingReads {
    fn write(&self, _key: &[u8], _value: &[u8]) -> OpStatus {
        OpStatus::Ok
    }

    fn read(&self, _key: &[u8]) -> OpStatus {
        OpStatus::Err
    }

    fn clean(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Records the highest number of concurrent calls it has seen
struct TrackingBackend {
    pause: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl TrackingBackend {
    fn with_pause(pause: Duration) -> Self {
        Self {
            pause,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn enter(&self) -> OpStatus {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.pause);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        OpStatus::Ok
    }
}

impl KvBackend for TrackingBackend {
    fn write(&self, _key: &[u8], _value: &[u8]) -> OpStatus {
        self.enter()
    }

    fn read(&self, _key: &[u8]) -> OpStatus {
        self.enter()
    }

    fn clean(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Refuses to reset
struct BrokenClean;

impl KvBackend for BrokenClean {
    fn write(&self, _key: &[u8], _value: &[u8]) -> OpStatus {
        OpStatus::Ok
    }

    fn read(&self, _key: &[u8]) -> OpStatus {
        OpStatus::Ok
    }

    fn clean(&self) -> anyhow::Result<()> {
        anyhow::bail!("store is read-only")
    }
}

/// Sink that keeps every persisted snapshot in memory
#[derive(Clone, Default)]
struct RecordingSink {
    saved: Arc<Mutex<Vec<DataList>>>,
}

impl ResultSink for RecordingSink {
    fn persist(&mut self, results: &DataList) -> Result<()> {
        self.saved.lock().unwrap().push(results.clone());
        Ok(())
    }
}

/// Sink whose saves always fail
#[derive(Clone, Default)]
struct FailingSink {
    attempts: Arc<AtomicUsize>,
}

impl ResultSink for FailingSink {
    fn persist(&mut self, _results: &DataList) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "disk is read-only").into())
    }
}

// ==================================================================================================
// Load Engine
// ==================================================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_client_full_length_run() {
    let opts = Arc::new(options("rand-write", 1));
    assert_eq!(opts.time_len, 10);

    let run = BenchRun::new(BenchType::RandWrite, opts.clone());
    let summary = run.execute(Arc::new(InstantBackend), words()).await.unwrap();

    assert!(summary.ok > 0);
    assert_eq!(summary.err, 0);

    // Every latency clamps to the minimum and lands in the first bucket
    assert_eq!(summary.histogram[0].count, summary.total());
    assert_eq!(summary.histogram[0].boundary, opts.time_cost_ranges[0]);

    let expected = summary.total() as f64 / 10.0;
    assert!(
        (summary.throughput - expected).abs() / expected < 0.05,
        "throughput {} vs {}",
        summary.throughput,
        expected
    );
    assert_eq!(summary.rates.len(), 10);
    assert_eq!(summary.rates.last().unwrap().elapsed_secs, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_reads_are_counted_not_retried() {
    let opts = Arc::new(short(options("rand-read", 4)));

    let run = BenchRun::new(BenchType::RandRead, opts);
    let summary = run.execute(Arc::new(FailingReads), words()).await.unwrap();

    assert_eq!(summary.ok, 0);
    assert!(summary.err > 0);
    assert_eq!(summary.err, summary.total());
    assert_eq!(
        summary.histogram.iter().map(|b| b.count).sum::<u64>(),
        summary.err
    );
    assert_eq!(summary.success_rate(), 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_in_flight_operations_bounded_by_client_num() {
    let opts = Arc::new(short(options("seq-write", 4)));
    let backend = Arc::new(TrackingBackend::with_pause(Duration::from_micros(300)));

    let run = BenchRun::new(BenchType::SeqWrite, opts);
    let summary = run.execute(backend.clone(), words()).await.unwrap();

    let max = backend.max_in_flight.load(Ordering::SeqCst);
    assert!(max >= 1);
    assert!(max <= 4, "saw {} concurrent operations", max);
    assert_eq!(backend.in_flight.load(Ordering::SeqCst), 0);
    assert!(summary.ok > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_read_run_with_single_key_population_terminates() {
    let mut opts = short(options("seq-read", 2));
    opts.read_population = 1;
    let opts = Arc::new(opts);

    let backend = Arc::new(MemoryBackend::new());
    let run = BenchRun::new(BenchType::SeqRead, opts);

    let summary = tokio::time::timeout(Duration::from_secs(10), run.execute(backend, words()))
        .await
        .expect("run did not terminate")
        .unwrap();

    assert!(summary.ok > 0);
    assert_eq!(summary.rates.len(), 2);
}

#[test]
fn test_client_num_above_default_blocking_pool_is_delivered() {
    // tokio's default blocking pool stops at 512 threads
    let client_num = 700;
    let runtime = build_runtime(client_num).unwrap();

    let opts = Arc::new(short(options("rand-write", client_num)));
    let backend = Arc::new(TrackingBackend::with_pause(Duration::from_millis(500)));

    let run = BenchRun::new(BenchType::RandWrite, opts);
    let summary = runtime
        .block_on(run.execute(backend.clone(), words()))
        .unwrap();

    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), client_num);
    assert_eq!(backend.in_flight.load(Ordering::SeqCst), 0);
    assert!(summary.ok >= client_num as u64);
}

// ==================================================================================================
// Orchestrator
// ==================================================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_orchestrator_aborts_on_clean_failure() {
    let sink = RecordingSink::default();
    let mut bench = KeyValueBench::new(
        short(options("rand-write,seq-write", 1)),
        Arc::new(BrokenClean),
        AlwaysIdle,
        Box::new(sink.clone()),
    );

    let err = bench.run().await.unwrap_err();
    assert!(matches!(err, BenchError::BackendSetup(_)));
    assert!(err.to_string().contains("store is read-only"));
    assert!(sink.saved.lock().unwrap().is_empty());
    assert!(bench.results().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_orchestrator_runs_in_canonical_order_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench_results.json");

    let mut opts = short(options("seq-write,rand-write", 2));
    opts.chart_legend = "memory".to_string();
    opts.chart_title = "in-process store".to_string();

    let backend = Arc::new(MemoryBackend::new());
    let mut bench = KeyValueBench::new(
        opts.clone(),
        backend,
        AlwaysIdle,
        Box::new(JsonFileSink::new(&path)),
    );

    let report = bench.run().await.unwrap();
    let names: Vec<&str> = report.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["memory/rand-write/client-x2", "memory/seq-write/client-x2"]);
    assert!(report.results.iter().all(|r| r.err == 0 && r.ok > 0));

    let saved = JsonFileSink::new(&path).load().unwrap();
    assert_eq!(saved.title, "in-process store");
    assert_eq!(saved.len(), 2);

    let dataset = saved.get("memory/seq-write/client-x2").unwrap();
    assert_eq!(dataset.attrs, vec!["memory", "seq-write", "client-x2", "throughput", "latency"]);
    assert_eq!(dataset.throughput.len(), 2);
    let percent: f64 = dataset.latency.iter().map(|l| l.percent).sum();
    assert!((percent - 100.0).abs() < 0.01);

    // A second invocation with another client count accumulates datasets
    opts.client_num = 1;
    opts.types = kvbench::bench::BenchTypeSet::parse("rand-write");
    let mut again = KeyValueBench::new(
        opts,
        Arc::new(MemoryBackend::new()),
        AlwaysIdle,
        Box::new(JsonFileSink::new(&path)),
    );
    assert_eq!(again.results().len(), 2);
    again.run().await.unwrap();

    let saved = JsonFileSink::new(&path).load().unwrap();
    assert_eq!(saved.len(), 3);
    assert!(saved.get("memory/rand-write").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_orchestrator_continues_after_failed_save() {
    let sink = FailingSink::default();
    let mut bench = KeyValueBench::new(
        short(options("rand-write,seq-write", 1)),
        Arc::new(MemoryBackend::new()),
        AlwaysIdle,
        Box::new(sink.clone()),
    );

    let report = bench.run().await.unwrap();
    let types: Vec<BenchType> = report.results.iter().map(|r| r.bench_type).collect();
    assert_eq!(types, vec![BenchType::RandWrite, BenchType::SeqWrite]);
    assert!(report.results.iter().all(|r| r.ok > 0));
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(bench.results().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_orchestrator_replaces_unreadable_results_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench_results.json");
    std::fs::write(&path, b"{ truncated").unwrap();

    let mut bench = KeyValueBench::new(
        short(options("seq-write", 1)),
        Arc::new(MemoryBackend::new()),
        AlwaysIdle,
        Box::new(JsonFileSink::new(&path)),
    );
    assert!(bench.results().is_empty());

    bench.run().await.unwrap();

    let saved = JsonFileSink::new(&path).load().unwrap();
    assert_eq!(saved.len(), 1);
    assert!(saved.get("seq-write").is_some());
}
