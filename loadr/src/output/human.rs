use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{describe_profile, format_duration, format_ms_opt, format_rate};
use progress::HumanProgress;
use summary::{format_observed, render};

use super::OutputFormatter;
use crate::profiles::{ProfileName, builtin};
use crate::run::RunPlan;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, plan: &RunPlan) {
        println!("target: {}", plan.base_url);
        println!("scenario: {}", plan.scenario.as_str());
        println!(
            "profile: {} ({})",
            plan.profile_label,
            describe_profile(&plan.config.profile)
        );
        print_thresholds(&plan.config.thresholds, "");
        println!();
    }

    fn progress(&self) -> Option<loadr_core::ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u| {
            let mut message = format!("vus={}/{}", u.live_vus, u.max_vus);
            if let Some(stage) = &u.stage {
                message.push_str(&format!(
                    " stage={}/{} target={}",
                    stage.index + 1,
                    stage.count,
                    stage.current_target
                ));
            }
            if u.draining_vus > 0 {
                message.push_str(&format!(" draining={}", u.draining_vus));
            }
            message.push_str(&format!(
                " elapsed={} iters={} rps={} p50={} p95={} failed={} checks_failed={}",
                format_duration(u.elapsed),
                u.iterations_total,
                format_rate(u.rps_now),
                format_ms_opt(u.latency_p50_ms_now),
                format_ms_opt(u.latency_p95_ms_now),
                u.failed_requests_total,
                u.checks_failed_total
            ));

            progress.update(&u.scenario, u.total_duration, u.elapsed, message);
        }))
    }

    fn print_summary(&self, result: &loadr_core::RunResult) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(result));

        let failed = result.failed_thresholds().collect::<Vec<_>>();
        if !failed.is_empty() {
            eprintln!("thresholds failed:");
            for t in failed {
                eprintln!(
                    "  {}: {} (observed {})",
                    t.metric,
                    t.expression,
                    format_observed(t.observed)
                );
            }
        }

        Ok(())
    }
}

pub(crate) fn print_profiles() {
    for name in ProfileName::ALL {
        let cfg = builtin(name);
        println!("{}: {}", name.as_str(), describe_profile(&cfg.profile));
        print_thresholds(&cfg.thresholds, "  ");
    }
}

fn print_thresholds(sets: &[loadr_core::ThresholdSet], indent: &str) {
    for set in sets {
        let exprs = set
            .expressions
            .iter()
            .map(|e| e.source.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let optional = if set.optional { " (optional)" } else { "" };
        println!("{indent}threshold: {} [{exprs}]{optional}", set.metric);
    }
}
