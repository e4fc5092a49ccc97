//! Staged-ramp load engine: VU scheduling, scenario execution, metrics and thresholds.

mod builtin_metrics;
mod config;
mod error;
mod progress;
mod run;
mod scenario;
mod schedule;
mod scheduler;
mod signal;
mod summary;
mod thresholds;
mod thresholds_eval;
mod vu;

pub use builtin_metrics::{
    CHECKS, DATA_RECEIVED, DATA_SENT, HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS,
    ITERATION_DURATION, ITERATIONS, TAG_ERROR, TAG_EXPECTED, TAG_GROUP, TAG_METHOD, TAG_NAME,
    TAG_SCENARIO, TAG_STATUS, VUS, VUS_MAX,
};
pub use config::{RunConfig, RunOptions, RunProfile, Stage, ThinkTime};
pub use error::{Error, Result};
pub use progress::{ProgressFn, ProgressUpdate};
pub use run::{Interrupt, RunController};
pub use scenario::{CheckResult, ExpectedStatuses, IterationContext, Scenario};
pub use schedule::{StageSnapshot, VuSchedule};
pub use summary::{CheckSummary, MetricSummary, RunResult, Verdict};
pub use thresholds::{
    MetricSelector, ThresholdAgg, ThresholdExpr, ThresholdExpression, ThresholdOp, ThresholdSet,
    parse_metric_selector, parse_threshold_expr,
};
pub use thresholds_eval::{
    CompiledThreshold, ThresholdOutcome, compile_thresholds, evaluate_thresholds,
};
