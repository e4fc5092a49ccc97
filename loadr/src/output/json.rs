use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::Arc;

use loadr_core::{MetricSummary, ProgressUpdate, RunResult, ThresholdOutcome};

use super::OutputFormatter;
use crate::run::RunPlan;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _plan: &RunPlan) {}

    fn progress(&self) -> Option<loadr_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, result: &RunResult) -> anyhow::Result<()> {
        let line = build_summary_line(result);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub total_secs: f64,
    pub scenario: String,
    pub stage: Option<JsonStage>,

    pub vus: u64,
    pub target_vus: u64,
    pub max_vus: u64,
    pub draining_vus: u64,

    pub iterations_total: u64,
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub checks_failed_total: u64,

    pub requests_per_sec: f64,
    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonStage {
    /// 1-based.
    pub stage: usize,
    pub stages: usize,
    pub target: u64,
    pub remaining_secs: f64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        total_secs: u.total_duration.as_secs_f64(),
        scenario: u.scenario.clone(),
        stage: u.stage.as_ref().map(|s| JsonStage {
            stage: s.index + 1,
            stages: s.count,
            target: s.current_target,
            remaining_secs: s.stage_remaining.as_secs_f64(),
        }),
        vus: u.live_vus,
        target_vus: u.target_vus,
        max_vus: u.max_vus,
        draining_vus: u.draining_vus,
        iterations_total: u.iterations_total,
        requests_total: u.requests_total,
        failed_requests_total: u.failed_requests_total,
        checks_failed_total: u.checks_failed_total,
        requests_per_sec: u.rps_now,
        latency_p50_ms: u.latency_p50_ms_now,
        latency_p95_ms: u.latency_p95_ms_now,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub verdict: String,
    pub elapsed_secs: f64,
    pub aborted_by: Option<JsonThreshold>,
    pub interrupted: bool,
    pub forced_stops: u64,
    pub thresholds: Vec<JsonThreshold>,
    pub checks: Vec<JsonCheck>,
    pub metrics: BTreeMap<String, JsonMetric>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
    pub abort_on_fail: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheck {
    pub name: String,
    pub group: Option<String>,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum JsonMetric {
    Counter {
        count: u64,
        per_sec: f64,
    },
    Gauge {
        value: Option<f64>,
        peak: Option<f64>,
    },
    Rate {
        hits: u64,
        total: u64,
        rate: f64,
    },
    Trend {
        count: u64,
        min: Option<f64>,
        max: Option<f64>,
        avg: Option<f64>,
        med: Option<f64>,
        p90: Option<f64>,
        p95: Option<f64>,
        p99: Option<f64>,
    },
}

impl From<&ThresholdOutcome> for JsonThreshold {
    fn from(t: &ThresholdOutcome) -> Self {
        Self {
            metric: t.metric.clone(),
            expression: t.expression.clone(),
            observed: t.observed,
            passed: t.passed,
            abort_on_fail: t.abort_on_fail,
        }
    }
}

impl From<&MetricSummary> for JsonMetric {
    fn from(m: &MetricSummary) -> Self {
        match m {
            MetricSummary::Counter { count, per_sec } => Self::Counter {
                count: *count,
                per_sec: *per_sec,
            },
            MetricSummary::Gauge { value, peak } => Self::Gauge {
                value: *value,
                peak: *peak,
            },
            MetricSummary::Rate(r) => Self::Rate {
                hits: r.hits,
                total: r.total,
                rate: r.rate(),
            },
            MetricSummary::Trend(t) => Self::Trend {
                count: t.count,
                min: t.min,
                max: t.max,
                avg: t.avg,
                med: t.med,
                p90: t.p90,
                p95: t.p95,
                p99: t.p99,
            },
        }
    }
}

fn build_summary_line(result: &RunResult) -> JsonSummaryLine {
    JsonSummaryLine {
        kind: "summary",
        verdict: result.verdict.to_string(),
        elapsed_secs: result.elapsed.as_secs_f64(),
        aborted_by: result.aborted_by.as_ref().map(JsonThreshold::from),
        interrupted: result.interrupted,
        forced_stops: result.forced_stops,
        thresholds: result.thresholds.iter().map(JsonThreshold::from).collect(),
        checks: result
            .checks
            .iter()
            .map(|c| JsonCheck {
                name: c.name.clone(),
                group: c.group.clone(),
                passes: c.passes,
                fails: c.fails,
            })
            .collect(),
        metrics: result
            .metrics
            .iter()
            .map(|(name, m)| (name.clone(), JsonMetric::from(m)))
            .collect(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
        let _ = out.flush();
    }
}
