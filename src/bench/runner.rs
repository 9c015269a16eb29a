//! Load engine: drives one benchmark run with bounded concurrency.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

use super::options::{BenchType, BenchmarkOptions};
use super::status::{RunSummary, Status};
use super::workload::{Operation, OperationSource, WordPool};
use crate::backend::KvBackend;
use crate::error::{BenchError, Result};

/// Blocking-pool threads kept beyond the client count for the write
/// producer, backend resets and read population
pub const BLOCKING_HEADROOM: usize = 16;

/// Multi-thread runtime whose blocking pool holds `client_num` backend calls
/// at once.
///
/// tokio's default pool stops at 512 threads, so larger client counts would
/// queue behind it instead of running concurrently.
pub fn build_runtime(client_num: usize) -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(client_num.max(1) + BLOCKING_HEADROOM)
        .build()
}

/// Lifecycle of a [`BenchRun`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunPhase {
    Idle = 0,
    Running = 1,
    Draining = 2,
    Done = 3,
}

impl RunPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunPhase::Running,
            2 => RunPhase::Draining,
            3 => RunPhase::Done,
            _ => RunPhase::Idle,
        }
    }
}

/// A single timed run of one benchmark type
pub struct BenchRun {
    typ: BenchType,
    options: Arc<BenchmarkOptions>,
    status: Arc<Status>,
    /// Set once the run length is reached; never cleared
    quit: Arc<AtomicBool>,
    /// Wakes the dispatch loop when the run length is reached
    stop: Arc<Notify>,
    phase: AtomicU8,
}

impl BenchRun {
    pub fn new(typ: BenchType, options: Arc<BenchmarkOptions>) -> Self {
        Self {
            typ,
            status: Arc::new(Status::new(&options)),
            options,
            quit: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(Notify::new()),
            phase: AtomicU8::new(RunPhase::Idle as u8),
        }
    }

    pub fn bench_type(&self) -> BenchType {
        self.typ
    }

    pub fn status(&self) -> &Arc<Status> {
        &self.status
    }

    pub fn phase(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_terminated(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    fn set_phase(&self, phase: RunPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Build the workload for this run's type and drive it to completion
    pub async fn execute<B: KvBackend>(
        &self,
        backend: Arc<B>,
        words: Arc<WordPool>,
    ) -> Result<RunSummary> {
        let source = OperationSource::prepare(
            self.typ,
            &self.options,
            backend.clone(),
            words,
            self.quit.clone(),
        )
        .await?;

        self.run(backend, source).await
    }

    /// Dispatch operations from `source` until the run length is reached,
    /// then wait for every in-flight operation before settling.
    ///
    /// Each backend call occupies a blocking-pool thread. The runtime needs
    /// room for `client_num` of them (see [`build_runtime`]) or the effective
    /// concurrency is capped by the pool.
    pub async fn run<B: KvBackend>(
        &self,
        backend: Arc<B>,
        mut source: OperationSource,
    ) -> Result<RunSummary> {
        let client_num = self.options.client_num.max(1);
        let slots = Arc::new(Semaphore::new(client_num));
        let recycle = source.recycler();

        tracing::debug!(
            "Starting {} with {} clients for {}s (step {}s)",
            self.typ,
            client_num,
            self.options.time_len,
            self.options.time_step
        );

        self.set_phase(RunPhase::Running);
        let start = Instant::now();
        let ticker = self.spawn_ticker();

        while !self.quit.load(Ordering::Acquire) {
            let next = tokio::select! {
                op = source.next() => op,
                _ = self.stop.notified() => break,
            };
            let Some(op) = next else {
                tracing::warn!("Workload for {} ended before the run length", self.typ);
                break;
            };

            let permit = slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| BenchError::Task(e.to_string()))?;
            let backend = backend.clone();
            let status = self.status.clone();
            let recycle = recycle.clone();

            tokio::task::spawn_blocking(move || {
                let ts = Instant::now();
                let result = match &op {
                    Operation::Write { key, value } => backend.write(key, value),
                    Operation::Read { key } => backend.read(key),
                };
                status.record(result, ts.elapsed().as_micros() as u64);

                if let (Some(recycle), Operation::Read { key }) = (recycle, op) {
                    // The ring holds exactly the population, a slot is always free
                    let _ = recycle.try_send(key);
                }
                drop(permit);
            });
        }

        self.quit.store(true, Ordering::Release);
        self.set_phase(RunPhase::Draining);

        // Every slot back in the pool means nothing is in flight
        let _all = slots
            .acquire_many(client_num as u32)
            .await
            .map_err(|e| BenchError::Task(e.to_string()))?;
        let elapsed = start.elapsed();

        ticker.abort();
        let _ = ticker.await;
        source.close().await;

        self.set_phase(RunPhase::Done);
        let summary = self.status.finalize(self.options.time_step, elapsed);

        tracing::debug!(
            "{} drained after {:.2}s: {} ok, {} err",
            self.typ,
            elapsed.as_secs_f64(),
            summary.ok,
            summary.err
        );

        Ok(summary)
    }

    /// Sample the completed count every step and flag the end of the run
    fn spawn_ticker(&self) -> JoinHandle<()> {
        let status = self.status.clone();
        let quit = self.quit.clone();
        let stop = self.stop.clone();
        let step = self.options.time_step.max(1);
        let time_len = self.options.time_len;

        tokio::spawn(async move {
            let period = Duration::from_secs(step);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            let mut time_used = 0;

            while !quit.load(Ordering::Acquire) {
                ticker.tick().await;
                time_used += step;
                status.sample(time_used);
                if time_used >= time_len {
                    quit.store(true, Ordering::Release);
                    stop.notify_one();
                }
            }
        })
    }
}
