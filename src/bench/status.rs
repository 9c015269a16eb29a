//! Per-run result aggregation: counters, latency buckets and the throughput
//! time series.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::options::BenchmarkOptions;
use crate::backend::OpStatus;

/// Upper bound of the high-resolution latency histogram (one hour)
const HDR_MAX_MICROS: u64 = 3_600_000_000;

/// One latency bucket: samples in `[boundary, next boundary)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyBucket {
    /// Lower boundary in microseconds
    pub boundary: u64,
    pub count: u64,
}

/// Cumulative completed operations at a sampling tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpsSample {
    pub elapsed_secs: u64,
    pub total: u64,
}

/// Operations per second over one sampling interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatePoint {
    pub elapsed_secs: u64,
    pub rate: f64,
}

/// Thread-safe aggregator owned by a single benchmark run
pub struct Status {
    time_cost_min: u64,
    time_cost_max: u64,
    /// Bucket boundaries, fixed for the lifetime of the run
    ranges: Arc<[u64]>,
    buckets: Vec<AtomicU64>,
    ok: AtomicU64,
    err: AtomicU64,
    /// Sum of unclamped latencies in microseconds
    latency_sum: AtomicU64,
    latency_hdr: Mutex<Histogram<u64>>,
    samples: Mutex<Vec<NpsSample>>,
}

impl Status {
    pub fn new(options: &BenchmarkOptions) -> Self {
        Self::with_ranges(
            options.time_cost_min,
            options.time_cost_max,
            options.time_cost_ranges.clone(),
        )
    }

    /// Aggregator over explicit bounds; `ranges` must be ascending and end at `max`
    pub fn with_ranges(min: u64, max: u64, ranges: Arc<[u64]>) -> Self {
        let buckets = ranges.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            time_cost_min: min,
            time_cost_max: max,
            ranges,
            buckets,
            ok: AtomicU64::new(0),
            err: AtomicU64::new(0),
            latency_sum: AtomicU64::new(0),
            latency_hdr: Mutex::new(
                Histogram::new_with_bounds(1, HDR_MAX_MICROS, 3)
                    .expect("constant histogram bounds are valid"),
            ),
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Count one completed operation and bucket its latency
    pub fn record(&self, status: OpStatus, elapsed_us: u64) {
        match status {
            OpStatus::Ok => self.ok.fetch_add(1, Ordering::Relaxed),
            OpStatus::Err => self.err.fetch_add(1, Ordering::Relaxed),
        };

        let clamped = elapsed_us.clamp(self.time_cost_min, self.time_cost_max);
        if let Some(bucket) = self.buckets.get(bucket_index(&self.ranges, clamped)) {
            bucket.fetch_add(1, Ordering::Relaxed);
        }

        self.latency_sum.fetch_add(elapsed_us, Ordering::Relaxed);
        self.latency_hdr
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .saturating_record(elapsed_us.max(1));
    }

    /// Append a time-series point with the current completed count
    pub fn sample(&self, elapsed_secs: u64) {
        let total = self.total();
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(NpsSample {
                elapsed_secs,
                total,
            });
    }

    pub fn ok(&self) -> u64 {
        self.ok.load(Ordering::Relaxed)
    }

    pub fn err(&self) -> u64 {
        self.err.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.ok() + self.err()
    }

    /// Current bucket counts paired with their boundaries
    pub fn histogram(&self) -> Vec<LatencyBucket> {
        self.ranges
            .iter()
            .zip(&self.buckets)
            .map(|(&boundary, count)| LatencyBucket {
                boundary,
                count: count.load(Ordering::Relaxed),
            })
            .collect()
    }

    pub fn samples(&self) -> Vec<NpsSample> {
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Latency at `percentile` in microseconds, 0 with no samples
    pub fn latency_percentile(&self, percentile: f64) -> u64 {
        let hdr = self.latency_hdr.lock().unwrap_or_else(|e| e.into_inner());
        if hdr.len() == 0 {
            0
        } else {
            hdr.value_at_percentile(percentile)
        }
    }

    /// Settle the run: per-interval rates and overall throughput.
    ///
    /// `step_secs` is the sampling step and `elapsed` the wall time from the
    /// first dispatch to the end of the drain.
    pub fn finalize(&self, step_secs: u64, elapsed: Duration) -> RunSummary {
        let ok = self.ok();
        let err = self.err();
        let total = ok + err;
        let elapsed_micros = (elapsed.as_micros() as u64).max(1);

        RunSummary {
            ok,
            err,
            elapsed_micros,
            throughput: total as f64 / elapsed_micros as f64 * 1e6,
            histogram: self.histogram(),
            rates: interval_rates(&self.samples(), step_secs),
            latency_mean_us: if total == 0 {
                0.0
            } else {
                self.latency_sum.load(Ordering::Relaxed) as f64 / total as f64
            },
            latency_p50_us: self.latency_percentile(50.0),
            latency_p95_us: self.latency_percentile(95.0),
            latency_p99_us: self.latency_percentile(99.0),
        }
    }
}

/// Index of the bucket a clamped latency falls into.
///
/// Picks the last boundary `<= value`, but never the final boundary itself:
/// it equals the latency max and closes the previous interval.
pub fn bucket_index(ranges: &[u64], value: u64) -> usize {
    let at_or_below = ranges.partition_point(|&b| b <= value);
    at_or_below
        .saturating_sub(1)
        .min(ranges.len().saturating_sub(2))
}

/// Turn cumulative samples into per-step rates
pub fn interval_rates(samples: &[NpsSample], step_secs: u64) -> Vec<RatePoint> {
    let step = step_secs.max(1) as f64;
    let mut previous = 0u64;

    samples
        .iter()
        .map(|s| {
            let delta = s.total.saturating_sub(previous);
            previous = s.total;
            RatePoint {
                elapsed_secs: s.elapsed_secs,
                rate: delta as f64 / step,
            }
        })
        .collect()
}

/// Final, read-only view of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub ok: u64,
    pub err: u64,
    pub elapsed_micros: u64,
    /// Operations per second over the whole run
    pub throughput: f64,
    pub histogram: Vec<LatencyBucket>,
    pub rates: Vec<RatePoint>,
    pub latency_mean_us: f64,
    pub latency_p50_us: u64,
    pub latency_p95_us: u64,
    pub latency_p99_us: u64,
}

impl RunSummary {
    pub fn total(&self) -> u64 {
        self.ok + self.err
    }

    /// Success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 100.0;
        }
        (self.ok as f64 / total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::options::latency_boundaries;
    use proptest::prelude::*;

    fn status(min: u64, max: u64) -> Status {
        Status::with_ranges(min, max, latency_boundaries(min, max).into())
    }

    #[test]
    fn test_bucket_index_partitions_range() {
        let ranges = [10, 20, 40, 80, 100];
        assert_eq!(bucket_index(&ranges, 10), 0);
        assert_eq!(bucket_index(&ranges, 19), 0);
        assert_eq!(bucket_index(&ranges, 20), 1);
        assert_eq!(bucket_index(&ranges, 79), 2);
        assert_eq!(bucket_index(&ranges, 80), 3);
        assert_eq!(bucket_index(&ranges, 100), 3);
    }

    #[test]
    fn test_bucket_index_below_first_boundary() {
        let ranges = [953, 1906, 5000];
        assert_eq!(bucket_index(&ranges, 1), 0);
        assert_eq!(bucket_index(&ranges, 952), 0);
    }

    #[test]
    fn test_record_counts_and_clamps() {
        let status = status(10, 100_000);

        status.record(OpStatus::Ok, 0);
        status.record(OpStatus::Ok, 15);
        status.record(OpStatus::Err, 50_000_000);
        status.record(OpStatus::Ok, 100_000);

        assert_eq!(status.ok(), 3);
        assert_eq!(status.err(), 1);

        let hist = status.histogram();
        assert_eq!(hist[0].count, 2);
        let last_open = hist.len() - 2;
        assert_eq!(hist[last_open].boundary, 81_920);
        assert_eq!(hist[last_open].count, 2);
        assert_eq!(hist.last().unwrap().count, 0);
        assert_eq!(hist.iter().map(|b| b.count).sum::<u64>(), 4);
    }

    #[test]
    fn test_sample_tracks_cumulative_total() {
        let status = status(10, 100_000);
        status.sample(1);
        status.record(OpStatus::Ok, 20);
        status.record(OpStatus::Err, 20);
        status.sample(2);

        assert_eq!(
            status.samples(),
            vec![
                NpsSample { elapsed_secs: 1, total: 0 },
                NpsSample { elapsed_secs: 2, total: 2 },
            ]
        );
    }

    #[test]
    fn test_interval_rates() {
        let samples = vec![
            NpsSample { elapsed_secs: 2, total: 100 },
            NpsSample { elapsed_secs: 4, total: 300 },
            NpsSample { elapsed_secs: 6, total: 300 },
        ];
        let rates = interval_rates(&samples, 2);
        assert_eq!(rates.iter().map(|r| r.rate).collect::<Vec<_>>(), vec![50.0, 100.0, 0.0]);
        assert_eq!(rates[1].elapsed_secs, 4);
    }

    #[test]
    fn test_finalize_throughput() {
        let status = status(10, 100_000);
        for _ in 0..500 {
            status.record(OpStatus::Ok, 40);
        }
        status.sample(1);

        let summary = status.finalize(1, Duration::from_millis(250));
        assert_eq!(summary.total(), 500);
        assert!((summary.throughput - 2_000.0).abs() < 1e-6);
        assert!((summary.latency_mean_us - 40.0).abs() < 1e-9);
        assert_eq!(summary.latency_p50_us, 40);
        assert_eq!(summary.rates[0].rate, 500.0);
        assert_eq!(summary.success_rate(), 100.0);
    }

    #[test]
    fn test_finalize_empty_run() {
        let summary = status(10, 100).finalize(1, Duration::ZERO);
        assert_eq!(summary.elapsed_micros, 1);
        assert_eq!(summary.throughput, 0.0);
        assert_eq!(summary.latency_mean_us, 0.0);
        assert_eq!(summary.latency_p99_us, 0);
    }

    #[test]
    fn test_concurrent_record() {
        let status = Arc::new(status(1, 10_000));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let status = status.clone();
                std::thread::spawn(move || {
                    for n in 0..1_000u64 {
                        let st = if n % 4 == 0 { OpStatus::Err } else { OpStatus::Ok };
                        status.record(st, (n * (i + 1)) % 20_000);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(status.total(), 8_000);
        assert_eq!(status.err(), 2_000);
        assert_eq!(status.histogram().iter().map(|b| b.count).sum::<u64>(), 8_000);
    }

    #[test]
    fn test_poisoned_locks_keep_recording() {
        let status = Arc::new(status(10, 100_000));

        let poisoner = status.clone();
        let _ = std::thread::spawn(move || {
            let _hdr = poisoner.latency_hdr.lock().unwrap();
            let _samples = poisoner.samples.lock().unwrap();
            panic!("backend call panicked");
        })
        .join();
        assert!(status.latency_hdr.is_poisoned());
        assert!(status.samples.is_poisoned());

        status.record(OpStatus::Ok, 500);
        status.sample(1);

        assert_eq!(status.latency_percentile(50.0), 500);
        assert_eq!(status.samples(), vec![NpsSample { elapsed_secs: 1, total: 1 }]);
    }

    proptest! {
        #[test]
        fn prop_histogram_sums_to_total(
            min in 1u64..1_000,
            factor in 10u64..10_000,
            latencies in proptest::collection::vec((any::<bool>(), 0u64..100_000_000), 0..300),
        ) {
            let status = status(min, min * factor);
            for (ok, us) in &latencies {
                status.record(if *ok { OpStatus::Ok } else { OpStatus::Err }, *us);
            }
            let sum: u64 = status.histogram().iter().map(|b| b.count).sum();
            prop_assert_eq!(sum, status.total());
            prop_assert_eq!(status.total(), latencies.len() as u64);
        }

        #[test]
        fn prop_rates_non_negative(increments in proptest::collection::vec(0u64..10_000, 1..50), step in 1u64..20) {
            let mut total = 0;
            let samples: Vec<NpsSample> = increments
                .iter()
                .enumerate()
                .map(|(i, inc)| {
                    total += inc;
                    NpsSample { elapsed_secs: (i as u64 + 1) * step, total }
                })
                .collect();
            let rates = interval_rates(&samples, step);
            prop_assert_eq!(rates.len(), samples.len());
            prop_assert!(rates.iter().all(|r| r.rate >= 0.0));
        }
    }
}
