use std::collections::BTreeMap;
use std::time::Duration;

use loadr_metrics::{Aggregate, RateValue, SeriesValue, Snapshot, TrendSummary};

use crate::builtin_metrics::{CHECKS, TAG_GROUP, TAG_NAME};
use crate::thresholds_eval::ThresholdOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricSummary {
    Counter { count: u64, per_sec: f64 },
    Gauge { value: Option<f64>, peak: Option<f64> },
    Rate(RateValue),
    Trend(TrendSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub group: Option<String>,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub verdict: Verdict,
    pub thresholds: Vec<ThresholdOutcome>,
    /// Every metric aggregated across all of its series.
    pub metrics: BTreeMap<String, MetricSummary>,
    pub checks: Vec<CheckSummary>,
    /// The `abortOnFail` threshold that ended the run early.
    pub aborted_by: Option<ThresholdOutcome>,
    /// Stopped through an [`Interrupt`](crate::Interrupt) before the profile ended.
    pub interrupted: bool,
    pub elapsed: Duration,
    pub forced_stops: u64,
}

impl RunResult {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    pub fn counter(&self, name: &str) -> Option<u64> {
        match self.metric(name)? {
            MetricSummary::Counter { count, .. } => Some(*count),
            _ => None,
        }
    }

    pub fn rate(&self, name: &str) -> Option<RateValue> {
        match self.metric(name)? {
            MetricSummary::Rate(r) => Some(*r),
            _ => None,
        }
    }

    pub fn trend(&self, name: &str) -> Option<&TrendSummary> {
        match self.metric(name)? {
            MetricSummary::Trend(t) => Some(t),
            _ => None,
        }
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.thresholds.iter().filter(|t| !t.passed)
    }
}

pub(crate) fn summarize_metrics(
    snapshot: &Snapshot,
    elapsed: Duration,
) -> BTreeMap<String, MetricSummary> {
    let secs = elapsed.as_secs_f64();
    snapshot
        .iter()
        .map(|m| {
            let summary = match m.aggregate(&[]) {
                Aggregate::Counter(count) => MetricSummary::Counter {
                    count,
                    per_sec: if secs > 0.0 { count as f64 / secs } else { 0.0 },
                },
                Aggregate::Gauge { value, peak } => MetricSummary::Gauge { value, peak },
                Aggregate::Rate(r) => MetricSummary::Rate(r),
                Aggregate::Trend(t) => MetricSummary::Trend(t.summary()),
            };
            (m.name.clone(), summary)
        })
        .collect()
}

/// Per `(group, name)` pass/fail counts from the `checks` series.
pub(crate) fn summarize_checks(snapshot: &Snapshot) -> Vec<CheckSummary> {
    let Some(checks) = snapshot.get(CHECKS) else {
        return Vec::new();
    };

    let mut by_key: BTreeMap<(Option<String>, String), (u64, u64)> = BTreeMap::new();
    for series in &checks.series {
        let SeriesValue::Rate { hits, total } = series.value else {
            continue;
        };
        let tag = |key: &str| {
            series
                .tags
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        let Some(name) = tag(TAG_NAME) else {
            continue;
        };
        let entry = by_key.entry((tag(TAG_GROUP), name)).or_default();
        entry.0 += hits;
        entry.1 += total - hits;
    }

    by_key
        .into_iter()
        .map(|((group, name), (passes, fails))| CheckSummary {
            name,
            group,
            passes,
            fails,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadr_metrics::{MetricKind, Registry};

    #[test]
    fn checks_are_grouped_by_group_and_name() {
        let r = Registry::new();
        let rec = |tags: &[(&str, &str)], v: f64| {
            r.record(CHECKS, MetricKind::Rate, v, tags)
                .unwrap_or_else(|e| panic!("{e}"));
        };
        rec(&[("name", "status is 200"), ("group", "Health"), ("scenario", "a")], 1.0);
        rec(&[("name", "status is 200"), ("group", "Health"), ("scenario", "a")], 0.0);
        rec(&[("name", "status is 200"), ("group", "Users"), ("scenario", "a")], 1.0);
        rec(&[("name", "ungrouped"), ("scenario", "a")], 1.0);

        let checks = summarize_checks(&r.snapshot());
        assert_eq!(checks.len(), 3);
        assert_eq!(
            checks[0],
            CheckSummary {
                name: "ungrouped".into(),
                group: None,
                passes: 1,
                fails: 0
            }
        );
        assert_eq!((checks[1].passes, checks[1].fails), (1, 1));
        assert_eq!(checks[2].group.as_deref(), Some("Users"));
    }

    #[test]
    fn counters_report_per_second_rate() {
        let r = Registry::new();
        r.record("http_reqs", MetricKind::Counter, 10.0, &[])
            .unwrap_or_else(|e| panic!("{e}"));
        let m = summarize_metrics(&r.snapshot(), Duration::from_secs(2));
        assert_eq!(
            m.get("http_reqs"),
            Some(&MetricSummary::Counter {
                count: 10,
                per_sec: 5.0
            })
        );
    }
}
