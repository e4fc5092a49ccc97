use clap::{ArgAction, Args, Parser, Subcommand};
use loadr_core::ThinkTime;
use std::path::PathBuf;
use std::time::Duration;

use crate::profiles::{ProfileName, parse_think_time};
use crate::scenarios::ScenarioName;

pub(crate) fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        "h" | "hr" | "hrs" | "hour" | "hours" => {
            let secs = value
                .checked_mul(60 * 60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        )),
    }
}

fn parse_positive_duration(input: &str) -> Result<Duration, String> {
    let d = parse_duration(input)?;
    if d.is_zero() {
        return Err(format!("duration '{}' must be greater than zero", input.trim()));
    }
    Ok(d)
}

fn parse_cli_think_time(input: &str) -> Result<ThinkTime, String> {
    parse_think_time(input, parse_duration)
}

/// Splits `METRIC=EXPR`, where `METRIC` may carry a `{tag=value}` selector.
pub(crate) fn parse_threshold_arg(input: &str) -> Result<(String, String), String> {
    let s = input.trim();
    let search_from = match (s.find('{'), s.find('=')) {
        (Some(open), Some(eq)) if open < eq => s[open..]
            .find('}')
            .map(|close| open + close)
            .ok_or_else(|| format!("unterminated tag selector in '{s}'"))?,
        _ => 0,
    };

    let eq = s[search_from..]
        .find('=')
        .map(|i| search_from + i)
        .ok_or_else(|| format!("invalid threshold '{s}' (expected METRIC=EXPR, e.g. http_req_failed=rate<0.1)"))?;

    let (metric, expr) = (s[..eq].trim(), s[eq + 1..].trim());
    if metric.is_empty() || expr.is_empty() {
        return Err(format!(
            "invalid threshold '{s}' (expected METRIC=EXPR, e.g. http_req_failed=rate<0.1)"
        ));
    }
    Ok((metric.to_string(), expr.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar and a human-readable summary.
    Human,
    /// Emit JSON progress lines and a final summary line (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "loadr",
    author,
    version,
    about = "Staged-ramp HTTP load generator for the users/products API",
    long_about = "loadr drives a pool of virtual users through a staged ramp profile against the users/products API, records k6-style metrics and judges the run against thresholds.\n\nConfiguration precedence: CLI flags > --config YAML file > --profile built-in.",
    after_help = "Examples:\n  loadr run --profile smoke\n  loadr run --profile load --base-url https://staging.example.com\n  loadr run --vus 20 --duration 1m --scenario crud --output json\n  loadr run --config profile.yaml --threshold 'http_req_duration{group=Health Checks}=p(99)<200'"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). LOADR_LOG / RUST_LOG take precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test
    Run(RunArgs),

    /// List the built-in profiles
    Profiles,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Target API base URL
    #[arg(long, env = "API_URL", default_value = "http://localhost:8080")]
    pub base_url: String,

    /// Built-in profile (defaults to `default` unless --config is given)
    #[arg(long, value_enum)]
    pub profile: Option<ProfileName>,

    /// YAML profile file layered over --profile
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of virtual users (switches to a fixed profile)
    #[arg(long)]
    pub vus: Option<u64>,

    /// Test duration (e.g. 10s, 250ms, 1m; switches to a fixed profile)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Iterations per VU (switches to a fixed profile)
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Add a threshold (repeatable), e.g. `http_req_failed=rate<0.1`
    #[arg(long = "threshold", value_name = "METRIC=EXPR", value_parser = parse_threshold_arg)]
    pub thresholds: Vec<(String, String)>,

    /// Drop every threshold from the profile and config file
    #[arg(long)]
    pub no_thresholds: bool,

    /// Pause between iterations of a VU (`1s`, or `500ms..2s` for a uniform random pause)
    #[arg(long, value_parser = parse_cli_think_time)]
    pub think_time: Option<ThinkTime>,

    /// Pause between the groups of a scenario iteration
    #[arg(long, value_parser = parse_duration, default_value = "1s")]
    pub pause: Duration,

    /// Per-request timeout [default: 60s]
    #[arg(long, value_parser = parse_positive_duration)]
    pub request_timeout: Option<Duration>,

    /// Scheduler control tick [default: 1s]
    #[arg(long, value_parser = parse_positive_duration)]
    pub tick: Option<Duration>,

    /// Time VUs get to finish their iteration when the run ends [default: 30s]
    #[arg(long, value_parser = parse_duration)]
    pub graceful_stop: Option<Duration>,

    /// Time a VU retired by a ramp-down gets to finish its iteration [default: 30s]
    #[arg(long, value_parser = parse_duration)]
    pub graceful_ramp_down: Option<Duration>,

    /// Cap for iteration-bounded runs [default: 10m]
    #[arg(long, value_parser = parse_positive_duration)]
    pub max_duration: Option<Duration>,

    /// Scenario to run
    #[arg(long, value_enum, default_value_t = ScenarioName::All)]
    pub scenario: ScenarioName,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(args: &[&str]) -> RunArgs {
        let argv = ["loadr", "run"].into_iter().chain(args.iter().copied());
        let cli = Cli::try_parse_from(argv).unwrap_or_else(|e| panic!("failed to parse args: {e}"));
        match cli.command {
            Command::Run(args) => args,
            Command::Profiles => panic!("expected run command"),
        }
    }

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(2 * 60 * 60)));
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_positive_duration("0s").is_err());
    }

    #[test]
    fn threshold_arg_splits_on_first_equals_after_selector() {
        assert_eq!(
            parse_threshold_arg("http_req_failed=rate<0.1"),
            Ok(("http_req_failed".to_string(), "rate<0.1".to_string()))
        );
        assert_eq!(
            parse_threshold_arg("http_req_duration{group=Health Checks}=p(99)<200"),
            Ok((
                "http_req_duration{group=Health Checks}".to_string(),
                "p(99)<200".to_string()
            ))
        );
        assert_eq!(
            parse_threshold_arg("errors=rate==0"),
            Ok(("errors".to_string(), "rate==0".to_string()))
        );
        assert!(parse_threshold_arg("http_req_failed").is_err());
        assert!(parse_threshold_arg("=rate<0.1").is_err());
        assert!(parse_threshold_arg("http_req_duration{group=x=p(95)<1").is_err());
    }

    #[test]
    fn cli_parses_run_overrides() {
        let args = run_args(&[
            "--base-url",
            "http://127.0.0.1:9000",
            "--profile",
            "smoke",
            "--vus",
            "2",
            "--duration",
            "250ms",
            "--threshold",
            "http_req_failed=rate<0.1",
            "--threshold",
            "checks=rate>0.9",
            "--think-time",
            "100ms..200ms",
            "--scenario",
            "crud",
            "--output",
            "json",
        ]);

        assert_eq!(args.base_url, "http://127.0.0.1:9000");
        assert_eq!(args.profile, Some(ProfileName::Smoke));
        assert_eq!(args.vus, Some(2));
        assert_eq!(args.duration, Some(Duration::from_millis(250)));
        assert_eq!(args.thresholds.len(), 2);
        assert_eq!(
            args.think_time,
            Some(ThinkTime::Uniform {
                min: Duration::from_millis(100),
                max: Duration::from_millis(200),
            })
        );
        assert_eq!(args.scenario, ScenarioName::Crud);
        assert_eq!(args.output, OutputFormat::Json);
        assert_eq!(args.pause, Duration::from_secs(1));
    }

    #[test]
    fn cli_defaults() {
        let args = run_args(&[]);
        assert_eq!(args.profile, None);
        assert_eq!(args.scenario, ScenarioName::All);
        assert_eq!(args.output, OutputFormat::Human);
        assert!(args.thresholds.is_empty());
        assert!(!args.no_thresholds);
    }

    #[test]
    fn cli_rejects_unknown_profile() {
        assert!(Cli::try_parse_from(["loadr", "run", "--profile", "soak"]).is_err());
    }
}
