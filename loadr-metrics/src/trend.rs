use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

use hdrhistogram::Histogram;
use parking_lot::Mutex;

const MAX_SHARDS: usize = 16;

// Window histogram tracks microseconds with 2 significant digits.
const WINDOW_SIGFIG: u8 = 2;

static NEXT_SHARD: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SHARD_HINT: Cell<Option<usize>> = const { Cell::new(None) };
}

fn shard_hint() -> usize {
    SHARD_HINT.with(|c| match c.get() {
        Some(v) => v,
        None => {
            let v = NEXT_SHARD.fetch_add(1, Ordering::Relaxed);
            c.set(Some(v));
            v
        }
    })
}

#[derive(Debug)]
struct Shard {
    samples: Vec<f64>,
    window: Option<Histogram<u64>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            samples: Vec::new(),
            window: Histogram::new(WINDOW_SIGFIG).ok(),
        }
    }
}

/// Keeps every raw sample so final percentiles are exact. A per-shard HDR histogram
/// collects the samples since the last progress tick.
#[derive(Debug)]
pub(crate) struct TrendStorage {
    shards: Box<[Mutex<Shard>]>,
}

/// Approximate percentiles over the samples recorded since the previous window take.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowSummary {
    pub count: u64,
    pub p50: Option<f64>,
    pub p95: Option<f64>,
}

impl TrendStorage {
    pub(crate) fn new() -> Self {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .clamp(1, MAX_SHARDS);
        let shards = (0..n).map(|_| Mutex::new(Shard::new())).collect();
        Self { shards }
    }

    pub(crate) fn record(&self, value: f64) {
        let idx = shard_hint() % self.shards.len();
        let Some(shard) = self.shards.get(idx) else {
            return;
        };
        let mut shard = shard.lock();
        shard.samples.push(value);
        if let Some(h) = shard.window.as_mut() {
            let us = (value * 1000.0).round().max(1.0) as u64;
            h.saturating_record(us);
        }
    }

    /// All raw samples, unordered.
    pub(crate) fn samples(&self) -> Vec<f64> {
        let mut out = Vec::new();
        for shard in self.shards.iter() {
            out.extend_from_slice(&shard.lock().samples);
        }
        out
    }

    /// Drains the shard windows into `into`.
    pub(crate) fn drain_window(&self, into: &mut Histogram<u64>) {
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            if let Some(h) = shard.window.as_mut() {
                let _ = into.add(&*h);
                h.reset();
            }
        }
    }
}

impl WindowSummary {
    pub(crate) fn from_histogram(h: &Histogram<u64>) -> Self {
        if h.is_empty() {
            return Self::default();
        }
        Self {
            count: h.len(),
            p50: Some(h.value_at_quantile(0.50) as f64 / 1000.0),
            p95: Some(h.value_at_quantile(0.95) as f64 / 1000.0),
        }
    }
}

pub(crate) fn new_window() -> Option<Histogram<u64>> {
    Histogram::new(WINDOW_SIGFIG).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_survive_window_drain() {
        let t = TrendStorage::new();
        for v in [10.0, 20.0, 30.0] {
            t.record(v);
        }

        let Some(mut h) = new_window() else {
            panic!("histogram");
        };
        t.drain_window(&mut h);
        let w = WindowSummary::from_histogram(&h);
        assert_eq!(w.count, 3);
        assert!(w.p50.is_some_and(|v| (v - 20.0).abs() < 0.5));

        let Some(mut h2) = new_window() else {
            panic!("histogram");
        };
        t.drain_window(&mut h2);
        assert_eq!(WindowSummary::from_histogram(&h2).count, 0);

        assert_eq!(t.samples().len(), 3);
    }
}
