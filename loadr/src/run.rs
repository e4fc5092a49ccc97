use anyhow::Context as _;
use loadr_core::{RunConfig, RunController, ThresholdExpression};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::profile_yaml::ProfileFile;
use crate::profiles::{self, ProfileName, add_threshold, override_fixed};
use crate::run_error::RunError;
use crate::scenarios::{self, ScenarioName};

/// Fully resolved run: the merged configuration plus what the output needs to describe it.
#[derive(Debug, Clone)]
pub(crate) struct RunPlan {
    pub profile_label: String,
    pub scenario: ScenarioName,
    pub base_url: String,
    pub config: RunConfig,
}

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let plan = plan(&args).await.map_err(RunError::InvalidInput)?;
    let out = output::formatter(args.output);

    let scenario = scenarios::build(plan.scenario, &plan.base_url, args.pause);
    let mut controller = RunController::new(plan.config.clone(), scenario)?;

    out.print_header(&plan);
    if let Some(progress) = out.progress() {
        controller = controller.with_progress(progress);
    }

    let interrupt = controller.interrupt_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping run");
            interrupt.trigger();
        }
    });

    let result = controller.run().await;
    ctrl_c.abort();
    let result = result?;

    out.print_summary(&result).map_err(RunError::RuntimeError)?;
    Ok(ExitCode::from_result(&result))
}

/// Merges the layers in precedence order: built-in profile, then `--config`, then flags.
pub(crate) async fn plan(args: &RunArgs) -> anyhow::Result<RunPlan> {
    loadr_http::validate_base_url(&args.base_url)
        .with_context(|| format!("invalid --base-url '{}'", args.base_url))?;

    let (mut config, mut label) = match (args.profile, &args.config) {
        (Some(name), _) => (profiles::builtin(name), name.as_str().to_string()),
        (None, Some(_)) => (profiles::empty(), String::new()),
        (None, None) => (
            profiles::builtin(ProfileName::Default),
            ProfileName::Default.as_str().to_string(),
        ),
    };

    if let Some(path) = &args.config {
        ProfileFile::load(path).await?.apply(&mut config)?;
        label = if label.is_empty() {
            path.display().to_string()
        } else {
            format!("{label} + {}", path.display())
        };
    }

    apply_cli_overrides(args, &mut config);

    Ok(RunPlan {
        profile_label: label,
        scenario: args.scenario,
        base_url: args.base_url.clone(),
        config,
    })
}

fn apply_cli_overrides(args: &RunArgs, config: &mut RunConfig) {
    if let Some(profile) =
        override_fixed(&config.profile, args.vus, args.duration, args.iterations)
    {
        config.profile = profile;
    }

    if args.no_thresholds {
        config.thresholds.clear();
    }
    for (metric, expr) in &args.thresholds {
        add_threshold(
            &mut config.thresholds,
            metric,
            ThresholdExpression::new(expr.as_str()),
        );
    }

    if let Some(t) = args.think_time {
        config.think_time = t;
    }

    let options = &mut config.options;
    if let Some(d) = args.request_timeout {
        options.request_timeout = d;
    }
    if let Some(d) = args.tick {
        options.tick = d;
    }
    if let Some(d) = args.graceful_stop {
        options.graceful_stop = d;
    }
    if let Some(d) = args.graceful_ramp_down {
        options.graceful_ramp_down = d;
    }
    if let Some(d) = args.max_duration {
        options.max_duration = d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;
    use loadr_core::{HTTP_REQ_FAILED, RunProfile, ThinkTime};
    use std::io::Write as _;
    use std::time::Duration;

    fn args(extra: &[&str]) -> RunArgs {
        let argv = ["loadr", "run", "--base-url", "http://127.0.0.1:8080"]
            .into_iter()
            .chain(extra.iter().copied());
        match Cli::try_parse_from(argv).unwrap_or_else(|e| panic!("parse: {e}")) {
            Cli {
                command: Command::Run(args),
                ..
            } => args,
            _ => panic!("expected run command"),
        }
    }

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap_or_else(|e| panic!("tempfile: {e}"));
        f.write_all(contents.as_bytes())
            .unwrap_or_else(|e| panic!("write: {e}"));
        f
    }

    async fn plan_of(a: &RunArgs) -> RunPlan {
        plan(a).await.unwrap_or_else(|e| panic!("plan: {e:#}"))
    }

    #[tokio::test]
    async fn default_profile_when_nothing_given() {
        let p = plan_of(&args(&[])).await;
        assert_eq!(p.profile_label, "default");
        assert_eq!(p.config.profile.max_vus(), 50);
        assert_eq!(p.config.thresholds.len(), 3);
    }

    #[tokio::test]
    async fn flags_override_config_file_which_overrides_profile() {
        let file = yaml_file(
            "vus: 3\nduration: 20s\nthinkTime: 250ms\nthresholds:\n  http_req_failed: rate<0.2\n",
        );
        let path = file.path().to_string_lossy().to_string();

        let p = plan_of(&args(&[
            "--profile",
            "smoke",
            "--config",
            &path,
            "--duration",
            "5s",
            "--threshold",
            "http_req_failed=rate<0.3",
            "--tick",
            "200ms",
        ]))
        .await;

        assert_eq!(
            p.config.profile,
            RunProfile::fixed_duration(3, Duration::from_secs(5))
        );
        assert_eq!(p.config.think_time, ThinkTime::Fixed(Duration::from_millis(250)));
        assert_eq!(p.config.options.tick, Duration::from_millis(200));
        assert_eq!(p.config.thresholds.len(), 1);
        assert_eq!(p.config.thresholds[0].metric, HTTP_REQ_FAILED);
        let sources = p.config.thresholds[0]
            .expressions
            .iter()
            .map(|e| e.source.as_str())
            .collect::<Vec<_>>();
        assert_eq!(sources, ["rate<0.2", "rate<0.3"]);
        assert!(p.profile_label.starts_with("smoke + "));
    }

    #[tokio::test]
    async fn config_alone_starts_from_an_empty_profile() {
        let file = yaml_file("stages:\n  - { duration: 10s, target: 2 }\n");
        let path = file.path().to_string_lossy().to_string();

        let p = plan_of(&args(&["--config", &path])).await;
        assert!(matches!(p.config.profile, RunProfile::Ramping { .. }));
        assert!(p.config.thresholds.is_empty());
    }

    #[tokio::test]
    async fn no_thresholds_clears_before_cli_additions() {
        let p = plan_of(&args(&["--no-thresholds"])).await;
        assert!(p.config.thresholds.is_empty());

        let p = plan_of(&args(&["--no-thresholds", "--threshold", "checks=rate>0.9"])).await;
        assert_eq!(p.config.thresholds.len(), 1);
    }

    #[tokio::test]
    async fn bad_inputs_are_rejected() {
        let missing = args(&["--config", "/definitely/not/here.yaml"]);
        assert!(plan(&missing).await.is_err());

        let bad_url = Cli::try_parse_from(["loadr", "run", "--base-url", "localhost:8080"])
            .unwrap_or_else(|e| panic!("parse: {e}"));
        let Command::Run(bad_url) = bad_url.command else {
            panic!("expected run command");
        };
        assert!(plan(&bad_url).await.is_err());
    }
}
