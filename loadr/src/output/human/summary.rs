use std::fmt::Write as _;

use loadr_core::{
    CheckSummary, DATA_RECEIVED, DATA_SENT, MetricSummary, RunResult, ThresholdOutcome,
};

use super::format::*;

pub(crate) fn render(result: &RunResult) -> String {
    let mut out = String::new();

    let verdict = if result.passed() { "PASS" } else { "FAIL" };
    writeln!(out, "summary: {verdict}").ok();
    writeln!(out, "  elapsed: {}", format_duration(result.elapsed)).ok();
    if let Some(a) = &result.aborted_by {
        writeln!(
            out,
            "  aborted by threshold: {}: {} (observed {})",
            a.metric,
            a.expression,
            format_observed(a.observed)
        )
        .ok();
    }
    if result.interrupted {
        out.push_str("  interrupted before the profile ended\n");
    }
    if result.forced_stops > 0 {
        writeln!(
            out,
            "  vus aborted after graceful stop: {}",
            result.forced_stops
        )
        .ok();
    }

    render_checks(&result.checks, &mut out);
    render_metrics(result, &mut out);
    render_thresholds(&result.thresholds, &mut out);

    out
}

fn render_checks(checks: &[CheckSummary], out: &mut String) {
    if checks.is_empty() {
        return;
    }

    out.push_str("\nchecks\n");

    let mut rows: Vec<&CheckSummary> = checks.iter().collect();
    rows.sort_by(|a, b| a.group.cmp(&b.group).then_with(|| a.name.cmp(&b.name)));

    let mut current_group: Option<Option<&str>> = None;
    for c in rows {
        let group = c.group.as_deref();
        if current_group != Some(group) {
            current_group = Some(group);
            writeln!(out, "  group: {}", group.unwrap_or("-")).ok();
        }
        let status = if c.fails > 0 { "FAIL" } else { "OK" };
        writeln!(
            out,
            "    {}: pass={} fail={} [{status}]",
            c.name, c.passes, c.fails
        )
        .ok();
    }
}

fn render_metrics(result: &RunResult, out: &mut String) {
    if result.metrics.is_empty() {
        return;
    }

    out.push_str("\nmetrics\n");
    for (name, m) in &result.metrics {
        let value = match m {
            MetricSummary::Counter { count, per_sec } if is_bytes(name) => format!(
                "{} ({}/s)",
                format_bytes(*count),
                format_bytes(per_sec.round() as u64)
            ),
            MetricSummary::Counter { count, per_sec } => format!("{count} ({per_sec:.2}/s)"),
            MetricSummary::Gauge { value, peak } => format!(
                "end={} peak={}",
                format_number_opt(*value),
                format_number_opt(*peak)
            ),
            MetricSummary::Rate(r) => {
                format!("{} ({}/{})", format_percent(r.rate()), r.hits, r.total)
            }
            MetricSummary::Trend(t) => {
                let f = |v: Option<f64>| {
                    if is_timing(name) {
                        format_ms_opt(v)
                    } else {
                        format_number_opt(v)
                    }
                };
                format!(
                    "avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={} (n={})",
                    f(t.avg),
                    f(t.min),
                    f(t.med),
                    f(t.max),
                    f(t.p90),
                    f(t.p95),
                    f(t.p99),
                    t.count
                )
            }
        };
        writeln!(out, "    {name} = {value}").ok();
    }
}

fn render_thresholds(thresholds: &[ThresholdOutcome], out: &mut String) {
    if thresholds.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for t in thresholds {
        let status = if t.passed { "OK" } else { "FAIL" };
        writeln!(
            out,
            "    {}: {} (observed {}) [{status}]",
            t.metric,
            t.expression,
            format_observed(t.observed)
        )
        .ok();
    }
}

fn is_bytes(name: &str) -> bool {
    name == DATA_SENT || name == DATA_RECEIVED
}

fn is_timing(name: &str) -> bool {
    name.ends_with("duration")
}

fn format_number_opt(v: Option<f64>) -> String {
    match v {
        Some(v) if v.fract() == 0.0 => format!("{v:.0}"),
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}

pub(crate) fn format_observed(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.4}")
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string(),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadr_core::Verdict;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn result() -> RunResult {
        let mut metrics = BTreeMap::new();
        metrics.insert(
            "http_reqs".to_string(),
            MetricSummary::Counter {
                count: 10,
                per_sec: 2.0,
            },
        );
        metrics.insert(
            "data_received".to_string(),
            MetricSummary::Counter {
                count: 4096,
                per_sec: 819.2,
            },
        );
        metrics.insert(
            "vus".to_string(),
            MetricSummary::Gauge {
                value: Some(0.0),
                peak: Some(5.0),
            },
        );

        RunResult {
            verdict: Verdict::Fail,
            thresholds: vec![ThresholdOutcome {
                metric: "http_req_failed".to_string(),
                expression: "rate<0.1".to_string(),
                observed: Some(0.25),
                passed: false,
                abort_on_fail: false,
            }],
            metrics,
            checks: vec![
                CheckSummary {
                    name: "health status is 200".to_string(),
                    group: Some("Health Checks".to_string()),
                    passes: 9,
                    fails: 1,
                },
                CheckSummary {
                    name: "top level".to_string(),
                    group: None,
                    passes: 10,
                    fails: 0,
                },
            ],
            aborted_by: None,
            interrupted: false,
            elapsed: Duration::from_secs(5),
            forced_stops: 0,
        }
    }

    #[test]
    fn renders_every_section() {
        let out = render(&result());

        assert!(out.starts_with("summary: FAIL\n"), "{out}");
        assert!(out.contains("  group: -\n    top level: pass=10 fail=0 [OK]"), "{out}");
        assert!(
            out.contains("  group: Health Checks\n    health status is 200: pass=9 fail=1 [FAIL]"),
            "{out}"
        );
        assert!(out.contains("    data_received = 4.00KiB (819B/s)"), "{out}");
        assert!(out.contains("    vus = end=0 peak=5"), "{out}");
        assert!(
            out.contains("    http_req_failed: rate<0.1 (observed 0.25) [FAIL]"),
            "{out}"
        );
    }

    #[test]
    fn observed_values_drop_trailing_zeros() {
        assert_eq!(format_observed(Some(0.25)), "0.25");
        assert_eq!(format_observed(Some(500.0)), "500");
        assert_eq!(format_observed(None), "n/a");
    }
}
