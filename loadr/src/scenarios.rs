use std::sync::Arc;
use std::time::Duration;

use loadr_core::{IterationContext, Scenario};
use loadr_http::HttpResponse;
use serde_json::Value;

mod all;
mod crud;
mod errors;
mod health;

/// Custom rate fed by check blocks: a sample per block, `true` when any check in it failed.
pub(crate) const ERRORS: &str = "errors";

/// Domain scenarios runnable with `--scenario`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioName {
    /// Health, users, products and error handling, separated by `--pause`.
    All,
    /// Liveness and readiness probes.
    Health,
    /// Users and products CRUD.
    Crud,
    /// Deliberate 404/500 responses.
    Errors,
}

impl ScenarioName {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Health => "health",
            Self::Crud => "crud",
            Self::Errors => "errors",
        }
    }
}

pub(crate) fn build(name: ScenarioName, base_url: &str, pause: Duration) -> Arc<dyn Scenario> {
    let api = Api::new(base_url);
    match name {
        ScenarioName::All => Arc::new(all::AllScenario { api, pause }),
        ScenarioName::Health => Arc::new(health::HealthScenario { api }),
        ScenarioName::Crud => Arc::new(crud::CrudScenario { api, pause }),
        ScenarioName::Errors => Arc::new(errors::ErrorsScenario { api }),
    }
}

/// Base URL of the target API.
#[derive(Debug, Clone)]
pub(crate) struct Api {
    base_url: String,
}

impl Api {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn status_is(res: Option<&HttpResponse>, status: u16) -> bool {
    res.is_some_and(|r| r.status == status)
}

fn json_body(res: Option<&HttpResponse>) -> Option<Value> {
    res.and_then(|r| r.json::<Value>().ok())
}

/// Records every check of a block and returns whether all of them passed.
fn check_all(ctx: &mut IterationContext, checks: &[(&str, bool)]) -> bool {
    checks
        .iter()
        .fold(true, |all, &(name, passed)| ctx.check(name, passed) && all)
}

/// [`check_all`] plus an [`ERRORS`] sample for the block.
fn check_tracked(ctx: &mut IterationContext, checks: &[(&str, bool)]) -> bool {
    let passed = check_all(ctx, checks);
    ctx.add_rate(ERRORS, !passed);
    passed
}

/// Millisecond timestamp used to make created names unique.
fn unique_suffix(ctx: &IterationContext) -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{millis}-{}-{}", ctx.vu_id(), ctx.iteration())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_joins_paths_without_double_slash() {
        let api = Api::new("http://localhost:8080/");
        assert_eq!(api.url("/health"), "http://localhost:8080/health");
    }

    #[test]
    fn scenarios_are_named_after_their_selector() {
        for name in [
            ScenarioName::All,
            ScenarioName::Health,
            ScenarioName::Crud,
            ScenarioName::Errors,
        ] {
            let scenario = build(name, "http://localhost:8080", Duration::ZERO);
            assert_eq!(scenario.name(), name.as_str());
        }
    }
}
