use std::sync::Arc;

use loadr_http::HttpClient;
use loadr_metrics::Registry;

use crate::builtin_metrics::BuiltinMetrics;
use crate::config::RunConfig;
use crate::progress::{LiveCounters, ProgressFn};
use crate::scenario::{Scenario, VuShared};
use crate::schedule::VuSchedule;
use crate::scheduler::StageScheduler;
use crate::signal::StopSignal;
use crate::summary::{RunResult, Verdict, summarize_checks, summarize_metrics};
use crate::thresholds_eval::{CompiledThreshold, compile_thresholds, evaluate_thresholds};
use crate::Result;

/// Validates a run, drives it to completion and judges it.
pub struct RunController {
    config: RunConfig,
    thresholds: Vec<CompiledThreshold>,
    scenario: Arc<dyn Scenario>,
    client: Option<HttpClient>,
    progress: Option<ProgressFn>,
    interrupt: Arc<StopSignal>,
}

/// Ends a run early. VUs get the usual graceful stop and thresholds are still evaluated.
#[derive(Clone)]
pub struct Interrupt(Arc<StopSignal>);

impl Interrupt {
    pub fn trigger(&self) {
        self.0.stop();
    }
}

impl RunController {
    /// Fails with a configuration error if the profile, timings, think time or any
    /// threshold is invalid. Nothing is spawned until [`RunController::run`].
    pub fn new(config: RunConfig, scenario: Arc<dyn Scenario>) -> Result<Self> {
        config.profile.validate()?;
        config.options.validate()?;
        config.think_time.validate()?;
        let thresholds = compile_thresholds(&config.thresholds)?;

        Ok(Self {
            config,
            thresholds,
            scenario,
            client: None,
            progress: None,
            interrupt: Arc::new(StopSignal::new()),
        })
    }

    #[must_use]
    pub fn with_client(mut self, client: HttpClient) -> Self {
        self.client = Some(client);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn interrupt_handle(&self) -> Interrupt {
        Interrupt(self.interrupt.clone())
    }

    pub async fn run(self) -> Result<RunResult> {
        let registry = Arc::new(Registry::new());
        let metrics = BuiltinMetrics::register(&registry)?;
        let counters = Arc::new(LiveCounters::default());

        let client = self
            .client
            .unwrap_or_default()
            .with_default_timeout(self.config.options.request_timeout);

        let shared = Arc::new(VuShared {
            scenario: self.scenario,
            client,
            registry: registry.clone(),
            metrics,
            counters: counters.clone(),
        });

        let scheduler = StageScheduler {
            schedule: VuSchedule::for_profile(&self.config.profile, self.config.options.max_duration),
            iterations: self.config.profile.iterations_per_vu(),
            think_time: self.config.think_time,
            options: self.config.options,
            shared,
            abort_thresholds: self
                .thresholds
                .iter()
                .filter(|t| t.abort_on_fail)
                .cloned()
                .collect(),
            progress: self.progress,
            interrupt: self.interrupt,
        };

        let outcome = scheduler.run(registry.clone(), metrics, counters).await;

        registry.freeze();
        let snapshot = registry.snapshot();
        drop(registry);

        let thresholds = evaluate_thresholds(&snapshot, &self.thresholds);
        let verdict = if outcome.aborted_by.is_none() && thresholds.iter().all(|t| t.passed) {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        tracing::info!(
            %verdict,
            elapsed = ?outcome.elapsed,
            thresholds = thresholds.len(),
            failed = thresholds.iter().filter(|t| !t.passed).count(),
            "run finished"
        );

        Ok(RunResult {
            verdict,
            metrics: summarize_metrics(&snapshot, outcome.elapsed),
            checks: summarize_checks(&snapshot),
            thresholds,
            aborted_by: outcome.aborted_by,
            interrupted: outcome.interrupted,
            elapsed: outcome.elapsed,
            forced_stops: outcome.forced_stops,
        })
    }
}
