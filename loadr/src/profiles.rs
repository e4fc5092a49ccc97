use std::time::Duration;

use loadr_core::{
    HTTP_REQ_DURATION, HTTP_REQ_FAILED, RunConfig, RunProfile, Stage, ThinkTime,
    ThresholdExpression, ThresholdSet,
};

use crate::scenarios::ERRORS;

/// Built-in load profiles selectable with `--profile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProfileName {
    /// 1 VU for 30s, strict latency and failure limits.
    Smoke,
    /// Ramp to 10 then 50 VUs over 4m30s.
    Default,
    /// Ramp to 100 then 200 VUs over 16m.
    Load,
    /// Step up to 400 VUs over 38m.
    Stress,
}

impl ProfileName {
    pub(crate) const ALL: [Self; 4] = [Self::Smoke, Self::Default, Self::Load, Self::Stress];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Smoke => "smoke",
            Self::Default => "default",
            Self::Load => "load",
            Self::Stress => "stress",
        }
    }
}

pub(crate) fn builtin(name: ProfileName) -> RunConfig {
    let (profile, thresholds) = match name {
        ProfileName::Smoke => (
            RunProfile::fixed_duration(1, Duration::from_secs(30)),
            vec![
                ThresholdSet::new(HTTP_REQ_DURATION, ["p(99)<1000"]),
                ThresholdSet::new(HTTP_REQ_FAILED, ["rate<0.01"]),
            ],
        ),
        ProfileName::Default => (
            RunProfile::ramping(
                0,
                stages(&[(30, 10), (60, 10), (30, 50), (60, 50), (30, 0)]),
            ),
            vec![
                ThresholdSet::new(HTTP_REQ_DURATION, ["p(95)<500"]),
                ThresholdSet::new(HTTP_REQ_FAILED, ["rate<0.1"]),
                // Only some scenarios feed `errors`.
                ThresholdSet::new(ERRORS, ["rate<0.1"]).optional(),
            ],
        ),
        ProfileName::Load => (
            RunProfile::ramping(
                0,
                stages(&[(120, 100), (300, 100), (120, 200), (300, 200), (120, 0)]),
            ),
            vec![
                ThresholdSet::new(HTTP_REQ_DURATION, ["p(99)<1500"]),
                ThresholdSet::new(HTTP_REQ_FAILED, ["rate<0.05"]),
            ],
        ),
        ProfileName::Stress => (
            RunProfile::ramping(
                0,
                stages(&[
                    (120, 100),
                    (300, 100),
                    (120, 200),
                    (300, 200),
                    (120, 300),
                    (300, 300),
                    (120, 400),
                    (300, 400),
                    (600, 0),
                ]),
            ),
            vec![ThresholdSet::new(HTTP_REQ_FAILED, ["rate<0.1"])],
        ),
    };

    RunConfig {
        thresholds,
        ..RunConfig::new(profile)
    }
}

/// Starting point when only a profile file is given: one VU, one iteration, no thresholds.
pub(crate) fn empty() -> RunConfig {
    RunConfig::new(RunProfile::Fixed {
        vus: 1,
        duration: None,
        iterations: None,
    })
}

fn stages(steps: &[(u64, u64)]) -> Vec<Stage> {
    steps
        .iter()
        .map(|&(secs, target)| Stage::new(Duration::from_secs(secs), target))
        .collect()
}

/// Fixed-shape replacement for `profile` when any of `vus`, `duration` or `iterations` is
/// set. Unset fields keep the values of a fixed `profile`; a ramping one starts from 1 VU.
pub(crate) fn override_fixed(
    profile: &RunProfile,
    vus: Option<u64>,
    duration: Option<Duration>,
    iterations: Option<u64>,
) -> Option<RunProfile> {
    if vus.is_none() && duration.is_none() && iterations.is_none() {
        return None;
    }

    let (base_vus, base_duration, base_iterations) = match profile {
        RunProfile::Fixed {
            vus,
            duration,
            iterations,
        } => (*vus, *duration, *iterations),
        RunProfile::Ramping { .. } => (1, None, None),
    };

    Some(RunProfile::Fixed {
        vus: vus.unwrap_or(base_vus),
        duration: duration.or(base_duration),
        iterations: iterations.or(base_iterations),
    })
}

/// Appends `expression` to the set for `metric`, creating the set if needed.
pub(crate) fn add_threshold(
    sets: &mut Vec<ThresholdSet>,
    metric: &str,
    expression: ThresholdExpression,
) {
    match sets.iter_mut().find(|s| s.metric == metric) {
        Some(set) => set.expressions.push(expression),
        None => sets.push(ThresholdSet {
            metric: metric.to_string(),
            expressions: vec![expression],
            optional: false,
        }),
    }
}

/// Parses `1s` as a fixed pause and `500ms..2s` as a uniform random one.
pub(crate) fn parse_think_time<F>(raw: &str, parse_duration: F) -> Result<ThinkTime, String>
where
    F: Fn(&str) -> Result<Duration, String>,
{
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("think time cannot be empty (expected e.g. 1s or 500ms..2s)".to_string());
    }

    match raw.split_once("..") {
        Some((min, max)) => {
            let min = parse_duration(min.trim())?;
            let max = parse_duration(max.trim())?;
            if min > max {
                return Err(format!("invalid think time '{raw}': minimum exceeds maximum"));
            }
            Ok(ThinkTime::Uniform { min, max })
        }
        None => {
            let d = parse_duration(raw)?;
            Ok(if d.is_zero() {
                ThinkTime::None
            } else {
                ThinkTime::Fixed(d)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn humantime_parse(s: &str) -> Result<Duration, String> {
        humantime::parse_duration(s).map_err(|e| e.to_string())
    }

    #[test]
    fn builtin_profiles_are_valid() {
        for name in ProfileName::ALL {
            let cfg = builtin(name);
            if let Err(err) = cfg.profile.validate() {
                panic!("{} profile invalid: {err}", name.as_str());
            }
            if let Err(err) = loadr_core::compile_thresholds(&cfg.thresholds) {
                panic!("{} thresholds invalid: {err}", name.as_str());
            }
        }
    }

    #[test]
    fn default_profile_peaks_at_fifty() {
        let cfg = builtin(ProfileName::Default);
        assert_eq!(cfg.profile.max_vus(), 50);
        assert_eq!(cfg.thresholds.len(), 3);
        assert!(cfg.thresholds.iter().any(|t| t.metric == ERRORS && t.optional));
    }

    #[test]
    fn stress_profile_runs_thirty_eight_minutes() {
        let cfg = builtin(ProfileName::Stress);
        let RunProfile::Ramping { stages, .. } = &cfg.profile else {
            panic!("stress should ramp");
        };
        let total: Duration = stages.iter().map(|s| s.duration).sum();
        assert_eq!(total, Duration::from_secs(38 * 60));
        assert_eq!(cfg.profile.max_vus(), 400);
    }

    #[test]
    fn override_keeps_unset_fixed_fields() {
        let smoke = builtin(ProfileName::Smoke).profile;
        assert_eq!(override_fixed(&smoke, None, None, None), None);
        assert_eq!(
            override_fixed(&smoke, Some(5), None, None),
            Some(RunProfile::fixed_duration(5, Duration::from_secs(30)))
        );

        let ramping = builtin(ProfileName::Load).profile;
        assert_eq!(
            override_fixed(&ramping, None, None, Some(3)),
            Some(RunProfile::fixed_iterations(1, 3))
        );
    }

    #[test]
    fn add_threshold_groups_by_metric() {
        let mut sets = builtin(ProfileName::Smoke).thresholds;
        add_threshold(&mut sets, HTTP_REQ_FAILED, ThresholdExpression::new("rate<0.5"));
        add_threshold(&mut sets, "checks", ThresholdExpression::new("rate>0.9"));

        assert_eq!(sets.len(), 3);
        let failed = sets.iter().find(|s| s.metric == HTTP_REQ_FAILED);
        assert_eq!(failed.map(|s| s.expressions.len()), Some(2));
    }

    #[test]
    fn think_time_forms() {
        assert_eq!(
            parse_think_time("1s", humantime_parse),
            Ok(ThinkTime::Fixed(Duration::from_secs(1)))
        );
        assert_eq!(
            parse_think_time("500ms..2s", humantime_parse),
            Ok(ThinkTime::Uniform {
                min: Duration::from_millis(500),
                max: Duration::from_secs(2),
            })
        );
        assert_eq!(parse_think_time("0s", humantime_parse), Ok(ThinkTime::None));
        assert!(parse_think_time("2s..1s", humantime_parse).is_err());
        assert!(parse_think_time("", humantime_parse).is_err());
        assert!(parse_think_time("soon", humantime_parse).is_err());
    }
}
