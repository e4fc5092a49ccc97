use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

use crate::key::{Interner, KeyId};
use crate::metrics::{MetricHandle, MetricKind, MetricStorage};
use crate::snapshot::{MetricSnapshot, SeriesSnapshot, SeriesValue, Snapshot};
use crate::tags::TagSet;
use crate::trend::{WindowSummary, new_window};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId(KeyId);

#[derive(Debug)]
struct MetricEntry {
    kind: MetricKind,
    series: DashMap<TagSet, Arc<MetricStorage>, ahash::RandomState>,
}

/// Thread-safe store of named, tagged metric series.
///
/// Series are created lazily on first write. After [`Registry::freeze`] all writes through
/// the registry fail with [`Error::Frozen`] and writes through existing handles are dropped.
#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    metrics: DashMap<MetricId, Arc<MetricEntry>, ahash::RandomState>,
    frozen: Arc<AtomicBool>,
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` with `kind`, or returns the existing id if the kinds agree.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<MetricId> {
        if !is_valid_name(name) {
            return Err(Error::InvalidName(name.to_string()));
        }

        let id = MetricId(self.interner.get_or_intern(name));
        let entry = self
            .metrics
            .entry(id)
            .or_insert_with(|| {
                Arc::new(MetricEntry {
                    kind,
                    series: DashMap::default(),
                })
            })
            .clone();

        if entry.kind != kind {
            return Err(Error::KindMismatch {
                name: name.to_string(),
                registered: entry.kind,
                requested: kind,
            });
        }
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<(MetricId, MetricKind)> {
        let id = MetricId(self.interner.get(name)?);
        self.metrics.get(&id).map(|e| (id, e.kind))
    }

    pub fn resolve_tags(&self, tags: &[(&str, &str)]) -> TagSet {
        TagSet::from_pairs(tags.iter().map(|(k, v)| {
            (
                self.interner.get_or_intern(k),
                self.interner.get_or_intern(v),
            )
        }))
    }

    /// Returns a handle to the series `(id, tags)`, creating it if needed.
    pub fn handle(&self, id: MetricId, tags: TagSet) -> Option<MetricHandle> {
        let entry = self.metrics.get(&id)?.clone();
        let kind = entry.kind;
        let storage = entry
            .series
            .entry(tags)
            .or_insert_with(|| Arc::new(MetricStorage::new(kind)))
            .clone();
        Some(MetricHandle {
            storage,
            frozen: self.frozen.clone(),
        })
    }

    /// One-shot write by name. Registers the metric on first use.
    pub fn record(
        &self,
        name: &str,
        kind: MetricKind,
        value: f64,
        tags: &[(&str, &str)],
    ) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::Frozen);
        }
        if !value.is_finite() {
            return Err(Error::NonFiniteValue(name.to_string()));
        }

        let id = self.register(name, kind)?;
        let tags = self.resolve_tags(tags);
        if let Some(handle) = self.handle(id, tags) {
            handle.record(value);
        }
        Ok(())
    }

    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Drains the progress window of every series of a trend metric.
    pub fn take_window(&self, name: &str) -> WindowSummary {
        let Some((id, MetricKind::Trend)) = self.lookup(name) else {
            return WindowSummary::default();
        };
        let Some(entry) = self.metrics.get(&id).map(|e| e.clone()) else {
            return WindowSummary::default();
        };
        let Some(mut merged) = new_window() else {
            return WindowSummary::default();
        };

        for series in entry.series.iter() {
            if let MetricStorage::Trend(t) = &**series.value() {
                t.drain_window(&mut merged);
            }
        }
        WindowSummary::from_histogram(&merged)
    }

    /// Point-in-time copy of every series.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_filtered(|_| true)
    }

    /// Point-in-time copy restricted to the named metrics.
    pub fn snapshot_only(&self, names: &[&str]) -> Snapshot {
        self.snapshot_filtered(|name| names.contains(&name))
    }

    fn snapshot_filtered(&self, keep: impl Fn(&str) -> bool) -> Snapshot {
        let mut out = Snapshot::default();

        for metric in self.metrics.iter() {
            let Some(name) = self.interner.resolve(metric.key().0) else {
                continue;
            };
            if !keep(&name) {
                continue;
            }
            let entry = metric.value();

            let mut series = Vec::with_capacity(entry.series.len());
            for s in entry.series.iter() {
                let Some(value) = self.series_value(s.value()) else {
                    continue;
                };
                let tags = s
                    .key()
                    .iter()
                    .filter_map(|(k, v)| {
                        Some((
                            self.interner.resolve(k)?.to_string(),
                            self.interner.resolve(v)?.to_string(),
                        ))
                    })
                    .collect();
                series.push(SeriesSnapshot { tags, value });
            }
            series.sort_by(|a, b| a.tags.cmp(&b.tags));

            out.insert(MetricSnapshot {
                name: name.to_string(),
                kind: entry.kind,
                series,
            });
        }
        out
    }

    fn series_value(&self, storage: &MetricStorage) -> Option<SeriesValue> {
        Some(match storage {
            MetricStorage::Counter(c) => SeriesValue::Counter(c.get()),
            MetricStorage::Gauge(g) => {
                let s = g.get();
                if !s.touched {
                    return None;
                }
                SeriesValue::Gauge {
                    value: s.value,
                    peak: s.peak,
                }
            }
            MetricStorage::Rate(r) => {
                let (hits, total) = r.get();
                SeriesValue::Rate { hits, total }
            }
            MetricStorage::Trend(t) => {
                let mut samples = t.samples();
                samples.sort_by(f64::total_cmp);
                SeriesValue::Trend(samples)
            }
        })
    }
}
