use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::schedule::StageSnapshot;

/// Run-wide totals kept outside the registry so progress ticks never walk every series.
#[derive(Debug, Default)]
pub(crate) struct LiveCounters {
    requests: AtomicU64,
    failed_requests: AtomicU64,
    iterations: AtomicU64,
    checks_failed: AtomicU64,
}

impl LiveCounters {
    pub(crate) fn inc_requests(&self, failed: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn inc_iterations(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_checks_failed(&self) {
        self.checks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub(crate) fn failed_requests(&self) -> u64 {
        self.failed_requests.load(Ordering::Relaxed)
    }

    pub(crate) fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub(crate) fn checks_failed(&self) -> u64 {
        self.checks_failed.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// 1-based.
    pub tick: u64,
    pub elapsed: Duration,
    pub total_duration: Duration,
    pub scenario: String,
    pub stage: Option<StageSnapshot>,
    pub live_vus: u64,
    pub target_vus: u64,
    pub max_vus: u64,
    pub draining_vus: u64,
    pub iterations_total: u64,
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub checks_failed_total: u64,
    /// Requests/sec over the last tick.
    pub rps_now: f64,
    /// Latency percentiles of responses completed during the last tick.
    pub latency_p50_ms_now: Option<f64>,
    pub latency_p95_ms_now: Option<f64>,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;
