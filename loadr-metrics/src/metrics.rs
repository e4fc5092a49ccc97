use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::trend::TrendStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

#[derive(Debug, Default)]
pub(crate) struct CounterStorage {
    value: AtomicU64,
}

impl CounterStorage {
    pub(crate) fn add(&self, v: u64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    pub(crate) fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct GaugeState {
    pub(crate) value: f64,
    pub(crate) peak: f64,
    pub(crate) touched: bool,
}

#[derive(Debug, Default)]
pub(crate) struct GaugeStorage {
    state: Mutex<GaugeState>,
}

impl GaugeStorage {
    pub(crate) fn set(&self, v: f64) {
        let mut s = self.state.lock();
        s.value = v;
        if !s.touched || v > s.peak {
            s.peak = v;
        }
        s.touched = true;
    }

    pub(crate) fn get(&self) -> GaugeState {
        *self.state.lock()
    }
}

#[derive(Debug, Default)]
pub(crate) struct RateStorage {
    hits: AtomicU64,
    total: AtomicU64,
}

impl RateStorage {
    pub(crate) fn add(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn get(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }
}

#[derive(Debug)]
pub(crate) enum MetricStorage {
    Counter(CounterStorage),
    Gauge(GaugeStorage),
    Rate(RateStorage),
    Trend(TrendStorage),
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(CounterStorage::default()),
            MetricKind::Gauge => Self::Gauge(GaugeStorage::default()),
            MetricKind::Rate => Self::Rate(RateStorage::default()),
            MetricKind::Trend => Self::Trend(TrendStorage::new()),
        }
    }

    pub(crate) fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Rate(_) => MetricKind::Rate,
            Self::Trend(_) => MetricKind::Trend,
        }
    }

    /// Applies one sample. Counters round to the nearest integer and never go below zero;
    /// rates treat any non-zero value as a hit.
    pub(crate) fn record(&self, value: f64) {
        match self {
            Self::Counter(c) => c.add(counter_increment(value)),
            Self::Gauge(g) => g.set(value),
            Self::Rate(r) => r.add(value != 0.0),
            Self::Trend(t) => t.record(value),
        }
    }
}

fn counter_increment(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let rounded = value.round();
    if rounded >= u64::MAX as f64 {
        u64::MAX
    } else {
        rounded as u64
    }
}

/// Pre-resolved handle to one tagged series. Writes after the registry is frozen are dropped.
#[derive(Debug, Clone)]
pub struct MetricHandle {
    pub(crate) storage: Arc<MetricStorage>,
    pub(crate) frozen: Arc<AtomicBool>,
}

impl MetricHandle {
    pub fn kind(&self) -> MetricKind {
        self.storage.kind()
    }

    fn live(&self) -> bool {
        !self.frozen.load(Ordering::Acquire)
    }

    pub fn record(&self, value: f64) {
        if self.live() && value.is_finite() {
            self.storage.record(value);
        }
    }

    pub fn add(&self, value: u64) {
        if !self.live() {
            return;
        }
        match &*self.storage {
            MetricStorage::Counter(c) => c.add(value),
            other => other.record(value as f64),
        }
    }

    pub fn add_bool(&self, hit: bool) {
        if !self.live() {
            return;
        }
        match &*self.storage {
            MetricStorage::Rate(r) => r.add(hit),
            other => other.record(if hit { 1.0 } else { 0.0 }),
        }
    }

    pub fn set(&self, value: f64) {
        self.record(value);
    }

    pub fn observe_duration(&self, d: std::time::Duration) {
        self.record(d.as_secs_f64() * 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_rounds_and_saturates() {
        assert_eq!(counter_increment(2.4), 2);
        assert_eq!(counter_increment(2.5), 3);
        assert_eq!(counter_increment(-3.0), 0);
        assert_eq!(counter_increment(f64::NAN), 0);
        assert_eq!(counter_increment(f64::INFINITY), 0);
    }

    #[test]
    fn gauge_tracks_peak() {
        let g = GaugeStorage::default();
        g.set(-2.0);
        assert_eq!(g.get().peak, -2.0);
        g.set(10.0);
        g.set(3.0);
        let s = g.get();
        assert_eq!(s.value, 3.0);
        assert_eq!(s.peak, 10.0);
    }

    #[test]
    fn rate_counts_non_zero_as_hits() {
        let s = MetricStorage::new(MetricKind::Rate);
        s.record(1.0);
        s.record(0.0);
        s.record(-4.0);
        match s {
            MetricStorage::Rate(r) => assert_eq!(r.get(), (2, 3)),
            other => panic!("unexpected storage {:?}", other.kind()),
        }
    }

    #[test]
    fn kind_parses_lowercase() {
        assert_eq!("trend".parse::<MetricKind>().ok(), Some(MetricKind::Trend));
        assert_eq!(MetricKind::Counter.to_string(), "counter");
    }
}
