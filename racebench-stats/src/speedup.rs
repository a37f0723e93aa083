//! Speedup Arithmetic

use serde::Serialize;
use std::time::Duration;

/// `baseline / model` elapsed time.
///
/// A zero model time yields infinity, a zero baseline yields zero.
pub fn speedup(baseline: Duration, model: Duration) -> f64 {
    if model.is_zero() {
        return f64::INFINITY;
    }
    baseline.as_secs_f64() / model.as_secs_f64()
}

/// Speedup of one model over the baseline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedupEntry {
    /// Model name
    pub model: String,
    /// Baseline elapsed / model elapsed
    pub ratio: f64,
}

/// Speedup of every non-baseline timing, in input order
pub fn compute_speedups<'a, I>(baseline: Duration, timings: I) -> Vec<SpeedupEntry>
where
    I: IntoIterator<Item = (&'a str, Duration)>,
{
    timings
        .into_iter()
        .map(|(model, elapsed)| SpeedupEntry {
            model: model.to_string(),
            ratio: speedup(baseline, elapsed),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speedup_ratio() {
        let s = speedup(Duration::from_millis(400), Duration::from_millis(100));
        assert!((s - 4.0).abs() < 1e-9);

        let slower = speedup(Duration::from_millis(100), Duration::from_millis(400));
        assert!((slower - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_speedup_degenerate_times() {
        assert!(speedup(Duration::from_millis(1), Duration::ZERO).is_infinite());
        assert_eq!(speedup(Duration::ZERO, Duration::from_millis(1)), 0.0);
    }

    #[test]
    fn test_compute_speedups_keeps_order() {
        let entries = compute_speedups(
            Duration::from_secs(2),
            [
                ("threads", Duration::from_secs(1)),
                ("processes", Duration::from_millis(500)),
            ],
        );
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].model, "threads");
        assert!((entries[0].ratio - 2.0).abs() < 1e-9);
        assert!((entries[1].ratio - 4.0).abs() < 1e-9);
    }
}
