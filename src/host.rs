//! Host quiescence gate: wait for CPU load to settle before a run.

use std::future::Future;
use std::time::Duration;

use sysinfo::System;

/// Default busy-percent threshold below which the host counts as idle
pub const DEFAULT_IDLE_THRESHOLD: f32 = 10.0;

/// Default window over which CPU usage is measured
pub const DEFAULT_SAMPLE_WINDOW: Duration = Duration::from_secs(3);

/// Source of a host "how busy is the CPU" signal
pub trait LoadProbe: Send {
    /// Global CPU usage in percent (0.0 to 100.0) over the probe's window
    fn busy_percent(&mut self) -> impl Future<Output = f32> + Send;
}

/// Samples global CPU usage with sysinfo
pub struct CpuLoadProbe {
    system: System,
    window: Duration,
}

impl CpuLoadProbe {
    pub fn new(window: Duration) -> Self {
        Self {
            system: System::new(),
            window: window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }
}

impl Default for CpuLoadProbe {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_WINDOW)
    }
}

impl LoadProbe for CpuLoadProbe {
    fn busy_percent(&mut self) -> impl Future<Output = f32> + Send {
        async move {
            self.system.refresh_cpu_usage();
            tokio::time::sleep(self.window).await;
            self.system.refresh_cpu_usage();
            self.system.global_cpu_usage()
        }
    }
}

/// Probe that always reports an idle host
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysIdle;

impl LoadProbe for AlwaysIdle {
    fn busy_percent(&mut self) -> impl Future<Output = f32> + Send {
        std::future::ready(0.0)
    }
}

/// Poll `probe` until the host is less than `threshold` percent busy.
///
/// Returns the last observed busy percentage.
pub async fn wait_for_idle<P: LoadProbe>(probe: &mut P, threshold: f32) -> f32 {
    loop {
        let busy = probe.busy_percent().await;
        if busy < threshold {
            tracing::debug!("Host idle: CPU {:.2}% busy", busy);
            return busy;
        }
        tracing::info!(
            "Waiting for host to settle: CPU {:.2}% busy (threshold {:.1}%)",
            busy,
            threshold
        );
    }
}
