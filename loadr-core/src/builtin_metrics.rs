use std::time::Duration;

use loadr_metrics::{MetricId, MetricKind, Registry};

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const DATA_SENT: &str = "data_sent";
pub const DATA_RECEIVED: &str = "data_received";
pub const CHECKS: &str = "checks";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const VUS: &str = "vus";
pub const VUS_MAX: &str = "vus_max";

pub const TAG_SCENARIO: &str = "scenario";
pub const TAG_GROUP: &str = "group";
pub const TAG_NAME: &str = "name";
pub const TAG_METHOD: &str = "method";
pub const TAG_STATUS: &str = "status";
pub const TAG_EXPECTED: &str = "expected_response";
pub const TAG_ERROR: &str = "error";

/// Ids of the metrics every run records, registered up front so a scenario cannot claim
/// one of their names with another kind.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BuiltinMetrics {
    pub(crate) http_reqs: MetricId,
    pub(crate) http_req_duration: MetricId,
    pub(crate) http_req_failed: MetricId,
    pub(crate) data_sent: MetricId,
    pub(crate) data_received: MetricId,
    pub(crate) checks: MetricId,
    pub(crate) iterations: MetricId,
    pub(crate) iteration_duration: MetricId,
    pub(crate) vus: MetricId,
    pub(crate) vus_max: MetricId,
}

/// One finished HTTP exchange, as seen by the metrics layer.
pub(crate) struct RequestSample<'a> {
    pub(crate) tags: &'a [(&'a str, &'a str)],
    /// `None` when the transport failed before a response arrived.
    pub(crate) elapsed: Option<Duration>,
    pub(crate) failed: bool,
    pub(crate) bytes_sent: u64,
    pub(crate) bytes_received: u64,
}

impl BuiltinMetrics {
    pub(crate) fn register(registry: &Registry) -> loadr_metrics::Result<Self> {
        Ok(Self {
            http_reqs: registry.register(HTTP_REQS, MetricKind::Counter)?,
            http_req_duration: registry.register(HTTP_REQ_DURATION, MetricKind::Trend)?,
            http_req_failed: registry.register(HTTP_REQ_FAILED, MetricKind::Rate)?,
            data_sent: registry.register(DATA_SENT, MetricKind::Counter)?,
            data_received: registry.register(DATA_RECEIVED, MetricKind::Counter)?,
            checks: registry.register(CHECKS, MetricKind::Rate)?,
            iterations: registry.register(ITERATIONS, MetricKind::Counter)?,
            iteration_duration: registry.register(ITERATION_DURATION, MetricKind::Trend)?,
            vus: registry.register(VUS, MetricKind::Gauge)?,
            vus_max: registry.register(VUS_MAX, MetricKind::Gauge)?,
        })
    }

    pub(crate) fn record_request(&self, registry: &Registry, sample: RequestSample<'_>) {
        let tags = registry.resolve_tags(sample.tags);

        if let Some(h) = registry.handle(self.http_reqs, tags.clone()) {
            h.add(1);
        }
        if let Some(elapsed) = sample.elapsed
            && let Some(h) = registry.handle(self.http_req_duration, tags.clone())
        {
            h.observe_duration(elapsed);
        }
        if let Some(h) = registry.handle(self.http_req_failed, tags.clone()) {
            h.add_bool(sample.failed);
        }
        if sample.bytes_sent > 0
            && let Some(h) = registry.handle(self.data_sent, tags.clone())
        {
            h.add(sample.bytes_sent);
        }
        if sample.bytes_received > 0
            && let Some(h) = registry.handle(self.data_received, tags)
        {
            h.add(sample.bytes_received);
        }
    }

    pub(crate) fn record_check(&self, registry: &Registry, tags: &[(&str, &str)], passed: bool) {
        if let Some(h) = registry.handle(self.checks, registry.resolve_tags(tags)) {
            h.add_bool(passed);
        }
    }

    pub(crate) fn record_iteration(
        &self,
        registry: &Registry,
        tags: &[(&str, &str)],
        elapsed: Duration,
    ) {
        let tags = registry.resolve_tags(tags);
        if let Some(h) = registry.handle(self.iterations, tags.clone()) {
            h.add(1);
        }
        if let Some(h) = registry.handle(self.iteration_duration, tags) {
            h.observe_duration(elapsed);
        }
    }

    pub(crate) fn set_vus(&self, registry: &Registry, scenario: &str, live: usize) {
        let tags = registry.resolve_tags(&[(TAG_SCENARIO, scenario)]);
        if let Some(h) = registry.handle(self.vus, tags) {
            h.set(live as f64);
        }
    }

    pub(crate) fn set_vus_max(&self, registry: &Registry, scenario: &str, max: u64) {
        let tags = registry.resolve_tags(&[(TAG_SCENARIO, scenario)]);
        if let Some(h) = registry.handle(self.vus_max, tags) {
            h.set(max as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadr_metrics::Aggregate;

    #[test]
    fn request_sample_feeds_all_http_metrics() {
        let r = Registry::new();
        let m = BuiltinMetrics::register(&r).unwrap_or_else(|e| panic!("{e}"));

        m.record_request(
            &r,
            RequestSample {
                tags: &[(TAG_NAME, "health"), (TAG_STATUS, "200")],
                elapsed: Some(Duration::from_millis(12)),
                failed: false,
                bytes_sent: 40,
                bytes_received: 120,
            },
        );
        m.record_request(
            &r,
            RequestSample {
                tags: &[(TAG_NAME, "health"), (TAG_STATUS, "0")],
                elapsed: None,
                failed: true,
                bytes_sent: 40,
                bytes_received: 0,
            },
        );

        let snap = r.snapshot();
        assert_eq!(snap.aggregate(HTTP_REQS, &[]), Some(Aggregate::Counter(2)));
        assert_eq!(snap.aggregate(DATA_SENT, &[]), Some(Aggregate::Counter(80)));
        assert_eq!(snap.aggregate(DATA_RECEIVED, &[]), Some(Aggregate::Counter(120)));
        match snap.aggregate(HTTP_REQ_FAILED, &[]) {
            Some(Aggregate::Rate(rate)) => assert_eq!(rate.rate(), 0.5),
            other => panic!("unexpected {other:?}"),
        }
        match snap.aggregate(HTTP_REQ_DURATION, &[]) {
            Some(Aggregate::Trend(t)) => {
                assert_eq!(t.count(), 1);
                assert_eq!(t.max(), Some(12.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn builtins_are_registered_before_any_sample() {
        let r = Registry::new();
        let _ = BuiltinMetrics::register(&r).unwrap_or_else(|e| panic!("{e}"));
        let snap = r.snapshot();
        for name in [HTTP_REQS, HTTP_REQ_DURATION, HTTP_REQ_FAILED, CHECKS, ITERATIONS, VUS] {
            assert!(snap.get(name).is_some(), "{name}");
        }
    }
}
