use std::time::Duration;

use loadr_metrics::{Aggregate, Snapshot};

use crate::thresholds::{
    MetricSelector, ThresholdAgg, ThresholdExpr, ThresholdSet, parse_metric_selector,
    parse_threshold_expr,
};
use crate::{Error, Result};

/// A threshold expression validated against its metric key.
#[derive(Debug, Clone)]
pub struct CompiledThreshold {
    pub metric: String,
    pub selector: MetricSelector,
    pub source: String,
    pub expr: ThresholdExpr,
    pub optional: bool,
    pub abort_on_fail: bool,
    pub delay_abort_eval: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    /// `None` when the metric has no samples or the aggregation does not apply to it.
    pub observed: Option<f64>,
    pub passed: bool,
    pub abort_on_fail: bool,
}

pub fn compile_thresholds(sets: &[ThresholdSet]) -> Result<Vec<CompiledThreshold>> {
    let mut out = Vec::new();
    for set in sets {
        let selector = parse_metric_selector(&set.metric).map_err(|error| {
            Error::InvalidThreshold {
                metric: set.metric.clone(),
                error,
            }
        })?;
        if set.expressions.is_empty() {
            return Err(Error::InvalidThreshold {
                metric: set.metric.clone(),
                error: "no expressions".to_string(),
            });
        }

        for e in &set.expressions {
            let expr = parse_threshold_expr(&e.source).map_err(|error| Error::InvalidThreshold {
                metric: set.metric.clone(),
                error,
            })?;
            out.push(CompiledThreshold {
                metric: set.metric.clone(),
                selector: selector.clone(),
                source: e.source.clone(),
                expr,
                optional: set.optional,
                abort_on_fail: e.abort_on_fail,
                delay_abort_eval: e.delay_abort_eval,
            });
        }
    }
    Ok(out)
}

/// Evaluates every threshold against `snapshot`. Each threshold is independent.
pub fn evaluate_thresholds(
    snapshot: &Snapshot,
    thresholds: &[CompiledThreshold],
) -> Vec<ThresholdOutcome> {
    thresholds.iter().map(|t| evaluate_one(snapshot, t)).collect()
}

pub(crate) fn evaluate_one(snapshot: &Snapshot, t: &CompiledThreshold) -> ThresholdOutcome {
    let aggregate = snapshot
        .aggregate(&t.selector.name, &t.selector.tags)
        .filter(|a| !is_empty(a));

    let (observed, passed) = match aggregate {
        // Never recorded: only an optional set may pass.
        None => (None, t.optional),
        Some(a) => {
            let observed = observed_value(&a, t.expr.agg);
            let passed = observed.is_some_and(|v| t.expr.op.compare(v, t.expr.value));
            (observed, passed)
        }
    };

    ThresholdOutcome {
        metric: t.metric.clone(),
        expression: t.source.clone(),
        observed,
        passed,
        abort_on_fail: t.abort_on_fail,
    }
}

fn is_empty(a: &Aggregate) -> bool {
    match a {
        Aggregate::Counter(v) => *v == 0,
        Aggregate::Gauge { value, .. } => value.is_none(),
        Aggregate::Rate(r) => r.total == 0,
        Aggregate::Trend(t) => t.count() == 0,
    }
}

fn observed_value(aggregate: &Aggregate, agg: ThresholdAgg) -> Option<f64> {
    match (aggregate, agg) {
        (Aggregate::Counter(v), ThresholdAgg::Count | ThresholdAgg::Value) => Some(*v as f64),

        (Aggregate::Gauge { value, .. }, ThresholdAgg::Value) => *value,
        (Aggregate::Gauge { peak, .. }, ThresholdAgg::Max) => *peak,

        (Aggregate::Rate(r), ThresholdAgg::Rate) => Some(r.rate()),
        (Aggregate::Rate(r), ThresholdAgg::Count) => Some(r.total as f64),

        (Aggregate::Trend(t), ThresholdAgg::Count) => Some(t.count() as f64),
        (Aggregate::Trend(t), ThresholdAgg::Avg) => t.avg(),
        (Aggregate::Trend(t), ThresholdAgg::Min) => t.min(),
        (Aggregate::Trend(t), ThresholdAgg::Max) => t.max(),
        (Aggregate::Trend(t), ThresholdAgg::Med) => t.med(),
        (Aggregate::Trend(t), ThresholdAgg::P(p)) => t.percentile(p),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::ThresholdExpression;
    use loadr_metrics::{MetricKind, Registry};

    fn compile(sets: &[ThresholdSet]) -> Vec<CompiledThreshold> {
        compile_thresholds(sets).unwrap_or_else(|e| panic!("{e}"))
    }

    fn feed_rate(r: &Registry, name: &str, hits: usize, misses: usize) {
        for i in 0..hits + misses {
            let v = if i < hits { 1.0 } else { 0.0 };
            r.record(name, MetricKind::Rate, v, &[])
                .unwrap_or_else(|e| panic!("{e}"));
        }
    }

    #[test]
    fn missing_metric_fails() {
        let t = compile(&[ThresholdSet::new("nope", ["count>0"])]);
        let out = evaluate_thresholds(&Registry::new().snapshot(), &t);
        assert_eq!(out.len(), 1);
        assert!(!out[0].passed);
        assert_eq!(out[0].observed, None);
    }

    #[test]
    fn optional_missing_metric_passes() {
        let t = compile(&[ThresholdSet::new("nope", ["count>0"]).optional()]);
        let out = evaluate_thresholds(&Registry::new().snapshot(), &t);
        assert!(out[0].passed);
    }

    #[test]
    fn registered_but_unrecorded_metrics_fail_unless_optional() {
        let r = Registry::new();
        r.register("http_req_failed", MetricKind::Rate)
            .unwrap_or_else(|e| panic!("{e}"));
        r.register("http_reqs", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));
        let snap = r.snapshot();

        let required = compile(&[
            ThresholdSet::new("http_req_failed", ["rate<0.1"]),
            ThresholdSet::new("http_reqs", ["count<5"]),
        ]);
        let out = evaluate_thresholds(&snap, &required);
        assert!(out.iter().all(|o| !o.passed), "{out:?}");
        assert!(out.iter().all(|o| o.observed.is_none()), "{out:?}");

        let optional = compile(&[
            ThresholdSet::new("http_req_failed", ["rate<0.1"]).optional(),
            ThresholdSet::new("http_reqs", ["count<5"]).optional(),
        ]);
        let out = evaluate_thresholds(&snap, &optional);
        assert!(out.iter().all(|o| o.passed), "{out:?}");
    }

    #[test]
    fn error_rate_boundary() {
        let t = compile(&[ThresholdSet::new("errors", ["rate<0.1"])]);

        let at_limit = Registry::new();
        feed_rate(&at_limit, "errors", 1, 9);
        let out = evaluate_thresholds(&at_limit.snapshot(), &t);
        assert!(!out[0].passed);
        assert_eq!(out[0].observed, Some(0.1));

        let below = Registry::new();
        feed_rate(&below, "errors", 99, 901);
        let out = evaluate_thresholds(&below.snapshot(), &t);
        assert!(out[0].passed);
    }

    #[test]
    fn trend_percentile_and_selector() {
        let r = Registry::new();
        for (v, status) in [(100.0, "200"), (200.0, "200"), (300.0, "200"), (400.0, "200"), (500.0, "200"), (9000.0, "500")] {
            r.record("http_req_duration", MetricKind::Trend, v, &[("status", status)])
                .unwrap_or_else(|e| panic!("{e}"));
        }
        let snap = r.snapshot();

        let t = compile(&[
            ThresholdSet::new("http_req_duration{status=200}", ["p(95)<=500", "med==300"]),
            ThresholdSet::new("http_req_duration", ["max<1000"]),
        ]);
        let out = evaluate_thresholds(&snap, &t);
        assert!(out[0].passed);
        assert_eq!(out[0].observed, Some(500.0));
        assert!(out[1].passed);
        assert!(!out[2].passed);
        assert_eq!(out[2].observed, Some(9000.0));
    }

    #[test]
    fn mismatched_aggregation_fails() {
        let r = Registry::new();
        feed_rate(&r, "checks", 1, 0);
        let t = compile(&[ThresholdSet::new("checks", ["p(95)<1"])]);
        let out = evaluate_thresholds(&r.snapshot(), &t);
        assert!(!out[0].passed);
    }

    #[test]
    fn compile_rejects_bad_input() {
        assert!(matches!(
            compile_thresholds(&[ThresholdSet::new("x", ["p(95)"])]),
            Err(Error::InvalidThreshold { .. })
        ));
        assert!(matches!(
            compile_thresholds(&[ThresholdSet::new("x{a=b", ["rate<1"])]),
            Err(Error::InvalidThreshold { .. })
        ));
        assert!(matches!(
            compile_thresholds(&[ThresholdSet::new("x", Vec::<String>::new())]),
            Err(Error::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn abort_flags_carry_through() {
        let set = ThresholdSet {
            metric: "http_req_failed".into(),
            expressions: vec![
                ThresholdExpression::new("rate<0.5").abort_on_fail(Some(Duration::from_secs(5))),
            ],
            optional: false,
        };
        let t = compile(&[set]);
        assert!(t[0].abort_on_fail);
        assert_eq!(t[0].delay_abort_eval, Some(Duration::from_secs(5)));
    }
}
