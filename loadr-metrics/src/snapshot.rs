use std::collections::BTreeMap;

use crate::metrics::MetricKind;

/// Frozen copy of a registry, keyed by metric name.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    metrics: BTreeMap<String, MetricSnapshot>,
}

#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    pub name: String,
    pub kind: MetricKind,
    pub series: Vec<SeriesSnapshot>,
}

#[derive(Debug, Clone)]
pub struct SeriesSnapshot {
    /// Sorted by key.
    pub tags: Vec<(String, String)>,
    pub value: SeriesValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SeriesValue {
    Counter(u64),
    Gauge { value: f64, peak: f64 },
    Rate { hits: u64, total: u64 },
    /// Sorted ascending.
    Trend(Vec<f64>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateValue {
    pub hits: u64,
    pub total: u64,
}

impl RateValue {
    /// Fraction of hits. Zero samples yield `0.0`.
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.hits as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendValue {
    samples: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrendSummary {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub med: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

impl TrendValue {
    pub fn from_unsorted(mut samples: Vec<f64>) -> Self {
        samples.sort_by(f64::total_cmp);
        Self { samples }
    }

    pub fn count(&self) -> u64 {
        self.samples.len() as u64
    }

    pub fn min(&self) -> Option<f64> {
        self.samples.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.samples.last().copied()
    }

    pub fn avg(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn med(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    /// Nearest-rank percentile: the sample at rank `ceil(p / 100 * n)`, clamped to `[1, n]`.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        let n = self.samples.len();
        if n == 0 || !p.is_finite() {
            return None;
        }
        let rank = (p * n as f64 / 100.0).ceil();
        let rank = if rank < 1.0 { 1 } else { (rank as usize).min(n) };
        self.samples.get(rank - 1).copied()
    }

    pub fn summary(&self) -> TrendSummary {
        TrendSummary {
            count: self.count(),
            min: self.min(),
            max: self.max(),
            avg: self.avg(),
            med: self.med(),
            p90: self.percentile(90.0),
            p95: self.percentile(95.0),
            p99: self.percentile(99.0),
        }
    }
}

/// A metric merged across every series matching a tag selector.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Counter(u64),
    Gauge {
        value: Option<f64>,
        peak: Option<f64>,
    },
    Rate(RateValue),
    Trend(TrendValue),
}

impl Aggregate {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge { .. } => MetricKind::Gauge,
            Self::Rate(_) => MetricKind::Rate,
            Self::Trend(_) => MetricKind::Trend,
        }
    }
}

impl MetricSnapshot {
    /// Merges series whose tags contain every pair of `selector`.
    ///
    /// Counters and gauge values sum, gauge peaks take the max, rates sum hits and totals,
    /// and trend samples are concatenated.
    pub fn aggregate(&self, selector: &[(String, String)]) -> Aggregate {
        let matching = self.series.iter().filter(|s| {
            selector
                .iter()
                .all(|(k, v)| s.tags.iter().any(|(tk, tv)| tk == k && tv == v))
        });

        match self.kind {
            MetricKind::Counter => Aggregate::Counter(
                matching
                    .filter_map(|s| match s.value {
                        SeriesValue::Counter(v) => Some(v),
                        _ => None,
                    })
                    .fold(0u64, u64::saturating_add),
            ),
            MetricKind::Gauge => {
                let mut value: Option<f64> = None;
                let mut peak: Option<f64> = None;
                for s in matching {
                    if let SeriesValue::Gauge { value: v, peak: p } = s.value {
                        value = Some(value.unwrap_or(0.0) + v);
                        peak = Some(peak.map_or(p, |cur| cur.max(p)));
                    }
                }
                Aggregate::Gauge { value, peak }
            }
            MetricKind::Rate => {
                let mut out = RateValue::default();
                for s in matching {
                    if let SeriesValue::Rate { hits, total } = s.value {
                        out.hits = out.hits.saturating_add(hits);
                        out.total = out.total.saturating_add(total);
                    }
                }
                Aggregate::Rate(out)
            }
            MetricKind::Trend => {
                let mut samples = Vec::new();
                for s in matching {
                    if let SeriesValue::Trend(v) = &s.value {
                        samples.extend_from_slice(v);
                    }
                }
                Aggregate::Trend(TrendValue::from_unsorted(samples))
            }
        }
    }
}

impl Snapshot {
    pub(crate) fn insert(&mut self, metric: MetricSnapshot) {
        self.metrics.insert(metric.name.clone(), metric);
    }

    pub fn get(&self, name: &str) -> Option<&MetricSnapshot> {
        self.metrics.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSnapshot> {
        self.metrics.values()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// `None` when the metric was never registered.
    pub fn aggregate(&self, name: &str, selector: &[(String, String)]) -> Option<Aggregate> {
        self.get(name).map(|m| m.aggregate(selector))
    }
}
