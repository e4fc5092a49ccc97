use crate::cli::OutputFormat;
use crate::run::RunPlan;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, plan: &RunPlan);
    fn progress(&self) -> Option<loadr_core::ProgressFn>;
    fn print_summary(&self, result: &loadr_core::RunResult) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Human => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}

pub(crate) use human::print_profiles;
