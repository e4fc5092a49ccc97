use std::time::Duration;

use rand::Rng as _;

use crate::{Error, Result};
use crate::thresholds::ThresholdSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Shape of the VU population over time. Exactly one mode per run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunProfile {
    /// Ramp from `start_vus` through each stage's target in order.
    Ramping { start_vus: u64, stages: Vec<Stage> },

    /// Flat load. `iterations` counts per VU; with neither `duration` nor `iterations`
    /// each VU runs a single iteration.
    Fixed {
        vus: u64,
        duration: Option<Duration>,
        iterations: Option<u64>,
    },
}

impl RunProfile {
    pub fn ramping(start_vus: u64, stages: Vec<Stage>) -> Self {
        Self::Ramping { start_vus, stages }
    }

    pub fn fixed_duration(vus: u64, duration: Duration) -> Self {
        Self::Fixed {
            vus,
            duration: Some(duration),
            iterations: None,
        }
    }

    pub fn fixed_iterations(vus: u64, iterations: u64) -> Self {
        Self::Fixed {
            vus,
            duration: None,
            iterations: Some(iterations),
        }
    }

    /// Per-VU iteration budget. `None` means VUs loop until told to stop.
    pub fn iterations_per_vu(&self) -> Option<u64> {
        match self {
            Self::Ramping { .. } => None,
            Self::Fixed {
                duration: None,
                iterations: None,
                ..
            } => Some(1),
            Self::Fixed { iterations, .. } => *iterations,
        }
    }

    pub fn max_vus(&self) -> u64 {
        match self {
            Self::Ramping { start_vus, stages } => stages
                .iter()
                .map(|s| s.target)
                .max()
                .unwrap_or(0)
                .max(*start_vus),
            Self::Fixed { vus, .. } => *vus,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Ramping { stages, .. } => {
                if stages.is_empty() {
                    return Err(Error::InvalidStages);
                }
                if let Some(index) = stages.iter().position(|s| s.duration.is_zero()) {
                    return Err(Error::ZeroStageDuration { index });
                }
                if self.max_vus() == 0 {
                    return Err(Error::NoVusScheduled);
                }
            }
            Self::Fixed {
                vus,
                duration,
                iterations,
            } => {
                if *vus == 0 {
                    return Err(Error::InvalidVus);
                }
                if duration.is_some_and(|d| d.is_zero()) {
                    return Err(Error::InvalidDuration);
                }
                if *iterations == Some(0) {
                    return Err(Error::InvalidIterations);
                }
            }
        }
        Ok(())
    }
}

/// Pause between two iterations of the same VU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThinkTime {
    #[default]
    None,
    Fixed(Duration),
    Uniform {
        min: Duration,
        max: Duration,
    },
}

impl ThinkTime {
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Uniform { min, max } if min > max => Err(Error::InvalidThinkTime(format!(
                "minimum {min:?} is greater than maximum {max:?}"
            ))),
            _ => Ok(()),
        }
    }

    pub fn sample(&self) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => d,
            Self::Uniform { min, max } if min >= max => min,
            Self::Uniform { min, max } => rand::thread_rng().gen_range(min..=max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Scheduler control tick.
    pub tick: Duration,
    /// How long VUs may keep running their current iteration once the run ends.
    pub graceful_stop: Duration,
    /// How long a VU retired by a ramp-down may keep running before it is aborted.
    pub graceful_ramp_down: Duration,
    /// Cap for iteration-bounded runs.
    pub max_duration: Duration,
    /// Default per-request timeout.
    pub request_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            graceful_stop: Duration::from_secs(30),
            graceful_ramp_down: Duration::from_secs(30),
            max_duration: Duration::from_secs(600),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if self.tick.is_zero() {
            return Err(Error::InvalidTiming("tick"));
        }
        if self.max_duration.is_zero() {
            return Err(Error::InvalidTiming("max_duration"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidTiming("request_timeout"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub profile: RunProfile,
    pub thresholds: Vec<ThresholdSet>,
    pub think_time: ThinkTime,
    pub options: RunOptions,
}

impl RunConfig {
    pub fn new(profile: RunProfile) -> Self {
        Self {
            profile,
            thresholds: Vec::new(),
            think_time: ThinkTime::None,
            options: RunOptions::default(),
        }
    }
}
