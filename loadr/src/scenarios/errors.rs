use async_trait::async_trait;
use loadr_core::{CheckResult, ExpectedStatuses, IterationContext, Scenario};
use loadr_http::HttpRequest;

use super::{Api, status_is};

pub(crate) const GROUP: &str = "Error Handling";

pub(crate) struct ErrorsScenario {
    pub(crate) api: Api,
}

#[async_trait]
impl Scenario for ErrorsScenario {
    fn name(&self) -> &str {
        "errors"
    }

    async fn run(&self, ctx: &mut IterationContext) -> Vec<CheckResult> {
        error_handling(ctx, &self.api).await;
        ctx.take_checks()
    }
}

/// Requests that must fail. The error statuses are declared expected so they do not count
/// toward `http_req_failed`, and the checks do not feed `errors`.
pub(crate) async fn error_handling(ctx: &mut IterationContext, api: &Api) {
    ctx.begin_group(GROUP);

    let res = ctx
        .request(
            "GET /api/users/{id}",
            HttpRequest::get(api.url("/api/users/99999")),
            &ExpectedStatuses::only([404]),
        )
        .await
        .ok();
    ctx.check("not found returns 404", status_is(res.as_ref(), 404));

    let res = ctx
        .request(
            "GET /api/error",
            HttpRequest::get(api.url("/api/error")),
            &ExpectedStatuses::only([500]),
        )
        .await
        .ok();
    ctx.check("error endpoint returns 500", status_is(res.as_ref(), 500));

    ctx.end_group();
}
