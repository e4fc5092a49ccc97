use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use loadr_core::{RunConfig, RunProfile, Stage, ThresholdExpression, ThresholdSet};
use serde::Deserialize;

use crate::profiles::{override_fixed, parse_think_time};

/// A load profile read from `--config`. Every field is optional and overrides the base
/// profile only when present.
///
/// ```yaml
/// startVUs: 0
/// stages:
///   - { duration: 30s, target: 10 }
///   - { duration: 1m, target: 0 }
/// thinkTime: 500ms..1s
/// thresholds:
///   http_req_duration: p(95)<500
///   http_req_failed:
///     - threshold: rate<0.1
///       abortOnFail: true
///       delayAbortEval: 10s
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ProfileFile {
    pub vus: Option<u64>,
    pub duration: Option<YamlDuration>,
    pub iterations: Option<u64>,

    #[serde(rename = "startVUs")]
    pub start_vus: Option<u64>,
    #[serde(default)]
    pub stages: Vec<StageYaml>,

    pub think_time: Option<String>,
    pub graceful_stop: Option<YamlDuration>,
    pub graceful_ramp_down: Option<YamlDuration>,

    /// Replaces the base thresholds when present, so `thresholds: {}` clears them.
    pub thresholds: Option<BTreeMap<String, ThresholdYaml>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub duration: YamlDuration,
    pub target: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdYaml {
    One(String),
    Many(Vec<ThresholdEntryYaml>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdEntryYaml {
    Expr(String),
    Detailed(DetailedThresholdYaml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct DetailedThresholdYaml {
    pub threshold: String,
    #[serde(default)]
    pub abort_on_fail: bool,
    pub delay_abort_eval: Option<YamlDuration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 30s, 2m), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|secs| YamlDuration(Duration::from_secs(secs)))
                    .map_err(|_| E::custom("duration cannot be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                humantime::parse_duration(v.trim())
                    .map(YamlDuration)
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

impl ThresholdYaml {
    fn into_set(self, metric: String) -> ThresholdSet {
        let expressions = match self {
            Self::One(expr) => vec![ThresholdExpression::new(expr)],
            Self::Many(entries) => entries
                .into_iter()
                .map(ThresholdEntryYaml::into_expression)
                .collect(),
        };
        ThresholdSet {
            metric,
            expressions,
            optional: false,
        }
    }
}

impl ThresholdEntryYaml {
    fn into_expression(self) -> ThresholdExpression {
        match self {
            Self::Expr(expr) => ThresholdExpression::new(expr),
            Self::Detailed(d) => {
                let expr = ThresholdExpression::new(d.threshold);
                if d.abort_on_fail {
                    expr.abort_on_fail(d.delay_abort_eval.map(YamlDuration::into_inner))
                } else {
                    expr
                }
            }
        }
    }
}

impl ProfileFile {
    pub(crate) async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read profile file: {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid profile file: {}", path.display()))
    }

    pub(crate) fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Layers the fields present in this file over `config`.
    pub(crate) fn apply(self, config: &mut RunConfig) -> anyhow::Result<()> {
        let duration = self.duration.map(YamlDuration::into_inner);

        if self.stages.is_empty() {
            anyhow::ensure!(self.start_vus.is_none(), "`startVUs` requires `stages`");
            if let Some(profile) =
                override_fixed(&config.profile, self.vus, duration, self.iterations)
            {
                config.profile = profile;
            }
        } else {
            anyhow::ensure!(
                self.vus.is_none() && duration.is_none() && self.iterations.is_none(),
                "`stages` cannot be combined with `vus`, `duration` or `iterations`"
            );
            let stages = self
                .stages
                .into_iter()
                .map(|s| Stage::new(s.duration.into_inner(), s.target))
                .collect();
            config.profile = RunProfile::ramping(self.start_vus.unwrap_or(0), stages);
        }

        if let Some(raw) = self.think_time.as_deref() {
            config.think_time = parse_think_time(raw, |s| {
                humantime::parse_duration(s).map_err(|e| format!("invalid duration '{s}': {e}"))
            })
            .map_err(anyhow::Error::msg)
            .context("invalid `thinkTime`")?;
        }
        if let Some(d) = self.graceful_stop {
            config.options.graceful_stop = d.into_inner();
        }
        if let Some(d) = self.graceful_ramp_down {
            config.options.graceful_ramp_down = d.into_inner();
        }

        if let Some(thresholds) = self.thresholds {
            config.thresholds = thresholds
                .into_iter()
                .map(|(metric, t)| t.into_set(metric))
                .collect();
        }

        Ok(())
    }
}
