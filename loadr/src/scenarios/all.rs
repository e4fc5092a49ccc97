use std::time::Duration;

use async_trait::async_trait;
use loadr_core::{CheckResult, IterationContext, Scenario};

use super::Api;
use super::crud::{product_operations, user_operations};
use super::errors::error_handling;
use super::health::health_checks;

/// Every group in turn with a pause after each one.
pub(crate) struct AllScenario {
    pub(crate) api: Api,
    pub(crate) pause: Duration,
}

#[async_trait]
impl Scenario for AllScenario {
    fn name(&self) -> &str {
        "all"
    }

    async fn run(&self, ctx: &mut IterationContext) -> Vec<CheckResult> {
        health_checks(ctx, &self.api).await;
        ctx.sleep(self.pause).await;

        user_operations(ctx, &self.api).await;
        ctx.sleep(self.pause).await;

        product_operations(ctx, &self.api).await;
        ctx.sleep(self.pause).await;

        error_handling(ctx, &self.api).await;
        ctx.sleep(self.pause).await;

        ctx.take_checks()
    }
}
