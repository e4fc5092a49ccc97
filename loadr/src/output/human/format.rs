use std::time::Duration;

use loadr_core::RunProfile;

pub(crate) fn format_bytes(b: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;

    if b >= GIB {
        return format!("{:.2}GiB", (b as f64) / (GIB as f64));
    }
    if b >= MIB {
        return format!("{:.2}MiB", (b as f64) / (MIB as f64));
    }
    if b >= KIB {
        return format!("{:.2}KiB", (b as f64) / (KIB as f64));
    }

    format!("{b}B")
}

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

/// Milliseconds, switching to seconds from 1000ms up.
pub(crate) fn format_ms(ms: f64) -> String {
    if !ms.is_finite() {
        return "n/a".to_string();
    }
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        format!("{ms:.2}ms")
    }
}

pub(crate) fn format_ms_opt(ms: Option<f64>) -> String {
    ms.map_or_else(|| "n/a".to_string(), format_ms)
}

/// Whole seconds, e.g. `4m 30s`.
pub(crate) fn format_duration(d: Duration) -> String {
    humantime::format_duration(Duration::from_secs(d.as_secs())).to_string()
}

pub(crate) fn format_percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

pub(crate) fn describe_profile(profile: &RunProfile) -> String {
    match profile {
        RunProfile::Ramping { start_vus, stages } => {
            let steps = stages
                .iter()
                .map(|s| format!("{}→{}", format_duration(s.duration), s.target))
                .collect::<Vec<_>>()
                .join(", ");
            format!("ramping from {start_vus} VUs: {steps}")
        }
        RunProfile::Fixed { vus, duration, .. } => match (duration, profile.iterations_per_vu()) {
            (Some(d), None) => format!("{vus} VUs for {}", format_duration(*d)),
            (Some(d), Some(n)) => format!(
                "{vus} VUs x {n} iterations (at most {})",
                format_duration(*d)
            ),
            (None, n) => format!("{vus} VUs x {} iterations", n.unwrap_or(1)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadr_core::Stage;

    #[test]
    fn bytes_scale_by_binary_units() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00MiB");
    }

    #[test]
    fn milliseconds_switch_to_seconds() {
        assert_eq!(format_ms(12.346), "12.35ms");
        assert_eq!(format_ms(1500.0), "1.50s");
        assert_eq!(format_ms_opt(None), "n/a");
    }

    #[test]
    fn profiles_are_described() {
        let ramp = RunProfile::ramping(
            0,
            vec![
                Stage::new(Duration::from_secs(30), 10),
                Stage::new(Duration::from_secs(90), 0),
            ],
        );
        assert_eq!(describe_profile(&ramp), "ramping from 0 VUs: 30s→10, 1m 30s→0");

        let fixed = RunProfile::fixed_duration(5, Duration::from_secs(60));
        assert_eq!(describe_profile(&fixed), "5 VUs for 1m");

        let iters = RunProfile::fixed_iterations(2, 3);
        assert_eq!(describe_profile(&iters), "2 VUs x 3 iterations");
    }
}
