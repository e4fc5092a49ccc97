#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loadr_core::{CheckResult, IterationContext, RunOptions, Scenario};

/// Two checks per iteration against `/health`, plus an `errors` sample.
pub struct HealthProbe {
    pub base_url: String,
}

pub const HEALTH_PROBE_CHECKS: u64 = 2;

#[async_trait]
impl Scenario for HealthProbe {
    fn name(&self) -> &str {
        "health_probe"
    }

    async fn run(&self, ctx: &mut IterationContext) -> Vec<CheckResult> {
        let url = format!("{}/health", self.base_url);
        let res = ctx.get("GET /health", &url).await.ok();

        let status_ok = ctx.check(
            "status is 200",
            res.as_ref().is_some_and(|r| r.status == 200),
        );
        let body_ok = ctx.check(
            "status is healthy",
            res.as_ref()
                .and_then(|r| r.json::<serde_json::Value>().ok())
                .is_some_and(|v| v["status"] == "healthy"),
        );
        ctx.add_rate("errors", !(status_ok && body_ok));

        ctx.take_checks()
    }
}

pub struct Panicky;

#[async_trait]
impl Scenario for Panicky {
    fn name(&self) -> &str {
        "panicky"
    }

    async fn run(&self, ctx: &mut IterationContext) -> Vec<CheckResult> {
        ctx.check("before panic", true);
        if ctx.iteration() == 0 {
            panic!("boom");
        }
        ctx.take_checks()
    }
}

/// Sleeps for `pause`, then passes one check.
pub struct Sleeper {
    pub pause: Duration,
}

#[async_trait]
impl Scenario for Sleeper {
    fn name(&self) -> &str {
        "sleeper"
    }

    async fn run(&self, ctx: &mut IterationContext) -> Vec<CheckResult> {
        ctx.sleep(self.pause).await;
        ctx.check("slept", true);
        ctx.take_checks()
    }
}

/// Leaves its checks in the context and returns an empty list.
pub struct LeavesChecksInContext;

#[async_trait]
impl Scenario for LeavesChecksInContext {
    fn name(&self) -> &str {
        "leaves_checks"
    }

    async fn run(&self, ctx: &mut IterationContext) -> Vec<CheckResult> {
        ctx.check("left behind", true);
        ctx.check("also left behind", false);
        Vec::new()
    }
}

pub fn sleeper(pause: Duration) -> Arc<dyn Scenario> {
    Arc::new(Sleeper { pause })
}

pub fn health_probe(base_url: &str) -> Arc<dyn Scenario> {
    Arc::new(HealthProbe {
        base_url: base_url.to_string(),
    })
}

pub fn fast_options() -> RunOptions {
    RunOptions {
        tick: Duration::from_millis(50),
        graceful_stop: Duration::from_secs(2),
        graceful_ramp_down: Duration::from_secs(2),
        max_duration: Duration::from_secs(30),
        request_timeout: Duration::from_secs(5),
    }
}
