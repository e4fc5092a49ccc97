use std::time::Duration;

use async_trait::async_trait;
use loadr_core::{CheckResult, IterationContext, Scenario};

use super::{Api, check_tracked, json_body, status_is};

pub(crate) const GROUP: &str = "Health Checks";

pub(crate) struct HealthScenario {
    pub(crate) api: Api,
}

#[async_trait]
impl Scenario for HealthScenario {
    fn name(&self) -> &str {
        "health"
    }

    async fn run(&self, ctx: &mut IterationContext) -> Vec<CheckResult> {
        health_checks(ctx, &self.api).await;
        ctx.take_checks()
    }
}

pub(crate) async fn health_checks(ctx: &mut IterationContext, api: &Api) {
    ctx.begin_group(GROUP);

    let res = ctx.get("GET /health", &api.url("/health")).await.ok();
    let body = json_body(res.as_ref());
    check_tracked(
        ctx,
        &[
            ("health status is 200", status_is(res.as_ref(), 200)),
            (
                "health response time < 200ms",
                res.as_ref()
                    .is_some_and(|r| r.elapsed < Duration::from_millis(200)),
            ),
            (
                "health status is healthy",
                body.is_some_and(|v| v["status"] == "healthy"),
            ),
        ],
    );

    let res = ctx.get("GET /ready", &api.url("/ready")).await.ok();
    let body = json_body(res.as_ref());
    check_tracked(
        ctx,
        &[
            ("readiness status is 200", status_is(res.as_ref(), 200)),
            ("service is ready", body.is_some_and(|v| v["ready"] == true)),
        ],
    );

    ctx.end_group();
}
