use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use loadr_http::{HttpClient, HttpRequest, HttpResponse, Method};
use loadr_metrics::{MetricKind, Registry};
use serde::Serialize;

use crate::builtin_metrics::{
    BuiltinMetrics, RequestSample, TAG_ERROR, TAG_EXPECTED, TAG_GROUP, TAG_METHOD, TAG_NAME,
    TAG_SCENARIO, TAG_STATUS,
};
use crate::progress::LiveCounters;

/// A unit of work executed once per VU iteration.
///
/// Implementations are shared by every VU of a run and must be safe to call concurrently.
/// Assertions are reported through [`IterationContext::check`], never by panicking; a
/// malformed response body is a failed check, not an error.
#[async_trait]
pub trait Scenario: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Returns the iteration's checks, usually [`IterationContext::take_checks`]. Checks
    /// still held by `ctx` when this returns are recorded as well.
    async fn run(&self, ctx: &mut IterationContext) -> Vec<CheckResult>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub group: Option<String>,
}

/// Status codes that count as a successful response for `http_req_failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedStatuses(Vec<RangeInclusive<u16>>);

impl Default for ExpectedStatuses {
    fn default() -> Self {
        Self(vec![200..=399])
    }
}

impl ExpectedStatuses {
    pub fn only(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self(statuses.into_iter().map(|s| s..=s).collect())
    }

    pub fn ranges(ranges: impl IntoIterator<Item = RangeInclusive<u16>>) -> Self {
        Self(ranges.into_iter().collect())
    }

    pub fn contains(&self, status: u16) -> bool {
        self.0.iter().any(|r| r.contains(&status))
    }
}

pub(crate) struct VuShared {
    pub(crate) scenario: Arc<dyn Scenario>,
    pub(crate) client: HttpClient,
    pub(crate) registry: Arc<Registry>,
    pub(crate) metrics: BuiltinMetrics,
    pub(crate) counters: Arc<LiveCounters>,
}

/// Per-iteration handle given to a [`Scenario`]: HTTP calls with metric recording, checks,
/// groups and custom metrics.
pub struct IterationContext {
    shared: Arc<VuShared>,
    vu_id: u64,
    iteration: u64,
    group: Option<String>,
    checks: Vec<CheckResult>,
}

impl IterationContext {
    pub(crate) fn new(shared: Arc<VuShared>, vu_id: u64, iteration: u64) -> Self {
        Self {
            shared,
            vu_id,
            iteration,
            group: None,
            checks: Vec::new(),
        }
    }

    /// 1-based id of the VU running this iteration.
    pub fn vu_id(&self) -> u64 {
        self.vu_id
    }

    /// 0-based iteration index within the VU.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn scenario_name(&self) -> &str {
        self.shared.scenario.name()
    }

    pub fn current_group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Tags subsequent requests, checks and custom metrics with `group=name`.
    pub fn begin_group(&mut self, name: &str) {
        self.group = Some(name.to_string());
    }

    pub fn end_group(&mut self) {
        self.group = None;
    }

    fn base_tags(&self) -> Vec<(&str, &str)> {
        let mut tags = vec![(TAG_SCENARIO, self.shared.scenario.name())];
        if let Some(g) = self.group.as_deref() {
            tags.push((TAG_GROUP, g));
        }
        tags
    }

    /// Sends `req` and records `http_reqs`, `http_req_duration`, `http_req_failed` and the
    /// data counters under `name`. Transport errors are returned to the caller after being
    /// recorded as failed requests.
    pub async fn request(
        &mut self,
        name: &str,
        req: HttpRequest,
        expected: &ExpectedStatuses,
    ) -> loadr_http::Result<HttpResponse> {
        let method = req.method.clone();
        let bytes_estimate = loadr_http::estimate_http_request_bytes(&req).unwrap_or(0);
        let res = self.shared.client.request(req).await;

        let status = match &res {
            Ok(r) => r.status.to_string(),
            Err(_) => "0".to_string(),
        };
        let error_kind = res
            .as_ref()
            .err()
            .map(|e| e.transport_error_kind().to_string());
        let failed = match &res {
            Ok(r) => !expected.contains(r.status),
            Err(_) => true,
        };

        let mut tags = self.base_tags();
        tags.push((TAG_NAME, name));
        tags.push((TAG_METHOD, method.as_str()));
        tags.push((TAG_STATUS, status.as_str()));
        tags.push((TAG_EXPECTED, if failed { "false" } else { "true" }));
        if let Some(kind) = error_kind.as_deref() {
            tags.push((TAG_ERROR, kind));
        }

        let (elapsed, bytes_sent, bytes_received) = match &res {
            Ok(r) => (Some(r.elapsed), r.bytes_sent, r.bytes_received),
            Err(_) => (None, bytes_estimate, 0),
        };
        self.shared.metrics.record_request(
            &self.shared.registry,
            RequestSample {
                tags: &tags,
                elapsed,
                failed,
                bytes_sent,
                bytes_received,
            },
        );
        self.shared.counters.inc_requests(failed);

        if let Err(err) = &res {
            tracing::debug!(vu = self.vu_id, request = name, error = %err, "request failed");
        }
        res
    }

    pub async fn get(&mut self, name: &str, url: &str) -> loadr_http::Result<HttpResponse> {
        self.request(name, HttpRequest::get(url), &ExpectedStatuses::default())
            .await
    }

    pub async fn delete(&mut self, name: &str, url: &str) -> loadr_http::Result<HttpResponse> {
        self.request(name, HttpRequest::delete(url), &ExpectedStatuses::default())
            .await
    }

    pub async fn post_json<T: Serialize + ?Sized + Sync>(
        &mut self,
        name: &str,
        url: &str,
        body: &T,
    ) -> loadr_http::Result<HttpResponse> {
        let req = HttpRequest::new(Method::POST, url).with_json(body)?;
        self.request(name, req, &ExpectedStatuses::default()).await
    }

    pub async fn put_json<T: Serialize + ?Sized + Sync>(
        &mut self,
        name: &str,
        url: &str,
        body: &T,
    ) -> loadr_http::Result<HttpResponse> {
        let req = HttpRequest::new(Method::PUT, url).with_json(body)?;
        self.request(name, req, &ExpectedStatuses::default()).await
    }

    /// Records a check under the current group and returns `passed`.
    pub fn check(&mut self, name: &str, passed: bool) -> bool {
        self.checks.push(CheckResult {
            name: name.to_string(),
            passed,
            group: self.group.clone(),
        });
        passed
    }

    /// Checks accumulated so far, leaving the context empty.
    pub fn take_checks(&mut self) -> Vec<CheckResult> {
        std::mem::take(&mut self.checks)
    }

    pub async fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }

    /// Adds a sample to a custom metric tagged with the current scenario and group.
    /// A name already registered with a different kind is logged and ignored.
    pub fn record(&self, name: &str, kind: MetricKind, value: f64) {
        if let Err(err) = self
            .shared
            .registry
            .record(name, kind, value, &self.base_tags())
        {
            tracing::warn!(metric = name, error = %err, "custom metric sample dropped");
        }
    }

    pub fn add_rate(&self, name: &str, hit: bool) {
        self.record(name, MetricKind::Rate, if hit { 1.0 } else { 0.0 });
    }

    pub fn add_trend(&self, name: &str, value: f64) {
        self.record(name, MetricKind::Trend, value);
    }

    pub fn add_counter(&self, name: &str, value: f64) {
        self.record(name, MetricKind::Counter, value);
    }

    pub(crate) fn record_checks(&self, checks: &[CheckResult]) {
        let scenario = self.shared.scenario.name();
        for c in checks {
            let mut tags = vec![(TAG_SCENARIO, scenario), (TAG_NAME, c.name.as_str())];
            if let Some(g) = c.group.as_deref() {
                tags.push((TAG_GROUP, g));
            }
            self.shared
                .metrics
                .record_check(&self.shared.registry, &tags, c.passed);
            if !c.passed {
                self.shared.counters.inc_checks_failed();
            }
        }
    }

    pub(crate) fn record_iteration(&self, started: Instant) {
        let scenario = self.shared.scenario.name();
        self.shared.metrics.record_iteration(
            &self.shared.registry,
            &[(TAG_SCENARIO, scenario)],
            started.elapsed(),
        );
        self.shared.counters.inc_iterations();
    }
}
