use std::time::Duration;

use crate::config::{RunProfile, Stage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    /// 0-based.
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Desired VU count as a pure function of elapsed run time.
#[derive(Debug, Clone)]
pub struct VuSchedule {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl VuSchedule {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let cumulative_ends = stages
            .iter()
            .scan(Duration::ZERO, |acc, s| {
                *acc = acc.saturating_add(s.duration);
                Some(*acc)
            })
            .collect();

        Self {
            start,
            stages,
            cumulative_ends,
        }
    }

    /// A flat schedule holding `vus` for `duration`.
    pub fn constant(vus: u64, duration: Duration) -> Self {
        Self::new(vus, vec![Stage::new(duration, vus)])
    }

    /// Fixed profiles without a duration run until `cap`.
    pub fn for_profile(profile: &RunProfile, cap: Duration) -> Self {
        match profile {
            RunProfile::Ramping { start_vus, stages } => Self::new(*start_vus, stages.clone()),
            RunProfile::Fixed { vus, duration, .. } => Self::constant(*vus, duration.unwrap_or(cap)),
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    pub fn max_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start, u64::max)
    }

    fn stage_index(&self, elapsed: Duration) -> usize {
        match self.cumulative_ends.binary_search(&elapsed) {
            Ok(i) | Err(i) => i.min(self.stages.len().saturating_sub(1)),
        }
    }

    fn stage_bounds(&self, idx: usize) -> (Duration, Duration, u64, u64) {
        let start_at = idx
            .checked_sub(1)
            .and_then(|i| self.cumulative_ends.get(i).copied())
            .unwrap_or(Duration::ZERO);
        let end_at = self
            .cumulative_ends
            .get(idx)
            .copied()
            .unwrap_or(start_at);
        let from = idx
            .checked_sub(1)
            .and_then(|i| self.stages.get(i))
            .map_or(self.start, |s| s.target);
        let to = self.stages.get(idx).map_or(from, |s| s.target);
        (start_at, end_at, from, to)
    }

    /// Linear interpolation inside the current stage, rounded half away from zero and
    /// clamped between the stage's endpoints.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if self.stages.is_empty() || elapsed.is_zero() {
            return self.start;
        }
        if self.is_done(elapsed) {
            return self.stages.last().map_or(self.start, |s| s.target);
        }

        let (start_at, end_at, from, to) = self.stage_bounds(self.stage_index(elapsed));
        interpolate(
            from,
            to,
            elapsed.saturating_sub(start_at),
            end_at.saturating_sub(start_at),
        )
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.stages.is_empty() {
            return None;
        }

        let clamped = elapsed.min(self.total_duration());
        let index = self.stage_index(clamped);
        let (start_at, end_at, start_target, end_target) = self.stage_bounds(index);
        let stage_duration = end_at.saturating_sub(start_at);
        let stage_elapsed = clamped.saturating_sub(start_at);

        Some(StageSnapshot {
            index,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            start_target,
            end_target,
            current_target: self.target_at(clamped),
        })
    }
}

fn interpolate(from: u64, to: u64, elapsed: Duration, duration: Duration) -> u64 {
    if duration.is_zero() {
        return to;
    }

    let delta = i128::from(to) - i128::from(from);
    let num = delta.saturating_mul(elapsed.as_nanos() as i128);
    let den = duration.as_nanos() as i128;

    // Integer division truncates toward zero; adding half the divisor first rounds half away.
    let step = if num >= 0 {
        (2 * num + den) / (2 * den)
    } else {
        -((2 * -num + den) / (2 * den))
    };

    let (lo, hi) = (from.min(to), from.max(to));
    (i128::from(from) + step).clamp(i128::from(lo), i128::from(hi)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn ramp_midpoint_is_linear() {
        let s = VuSchedule::new(10, vec![Stage::new(secs(30), 50)]);
        assert_eq!(s.target_at(secs(15)), 30);
        assert_eq!(s.target_at(Duration::ZERO), 10);
        assert_eq!(s.target_at(secs(30)), 50);
        assert_eq!(s.target_at(secs(99)), 50);
    }

    #[test]
    fn interpolation_rounds_half_away_from_zero() {
        let up = VuSchedule::new(0, vec![Stage::new(secs(2), 1)]);
        assert_eq!(up.target_at(secs(1)), 1);

        let down = VuSchedule::new(1, vec![Stage::new(secs(2), 0)]);
        assert_eq!(down.target_at(secs(1)), 0);

        let s = VuSchedule::new(0, vec![Stage::new(secs(10), 3)]);
        // 3 * 4 / 10 = 1.2
        assert_eq!(s.target_at(secs(4)), 1);
        // 3 * 5 / 10 = 1.5
        assert_eq!(s.target_at(secs(5)), 2);
    }

    #[test]
    fn multi_stage_profile() {
        let s = VuSchedule::new(
            0,
            vec![
                Stage::new(secs(30), 10),
                Stage::new(secs(60), 10),
                Stage::new(secs(30), 50),
                Stage::new(secs(60), 50),
                Stage::new(secs(30), 0),
            ],
        );
        assert_eq!(s.total_duration(), secs(210));
        assert_eq!(s.max_target(), 50);
        assert_eq!(s.target_at(secs(15)), 5);
        assert_eq!(s.target_at(secs(60)), 10);
        assert_eq!(s.target_at(secs(105)), 30);
        assert_eq!(s.target_at(secs(165)), 50);
        assert_eq!(s.target_at(secs(195)), 25);
        assert_eq!(s.target_at(secs(210)), 0);
        assert!(s.is_done(secs(210)));
    }

    #[test]
    fn snapshot_reports_stage_position() {
        let s = VuSchedule::new(0, vec![Stage::new(secs(10), 10), Stage::new(secs(10), 0)]);
        let Some(snap) = s.stage_snapshot_at(secs(15)) else {
            panic!("expected snapshot");
        };
        assert_eq!(snap.index, 1);
        assert_eq!(snap.count, 2);
        assert_eq!(snap.stage_elapsed, secs(5));
        assert_eq!(snap.stage_remaining, secs(5));
        assert_eq!((snap.start_target, snap.end_target), (10, 0));
        assert_eq!(snap.current_target, 5);

        let Some(end) = s.stage_snapshot_at(secs(100)) else {
            panic!("expected snapshot");
        };
        assert_eq!(end.index, 1);
        assert_eq!(end.stage_remaining, Duration::ZERO);
    }

    #[test]
    fn fixed_profile_without_duration_uses_cap() {
        let p = RunProfile::fixed_iterations(4, 2);
        let s = VuSchedule::for_profile(&p, secs(600));
        assert_eq!(s.total_duration(), secs(600));
        assert_eq!(s.target_at(secs(1)), 4);
        assert_eq!(s.target_at(Duration::ZERO), 4);
    }
}
