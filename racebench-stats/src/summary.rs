//! Race Trial Summary

use crate::histogram::OutcomeHistogram;
use serde::Serialize;

/// Point estimates over one policy's trials
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceStatistics {
    /// Trials recorded
    pub trials: u64,
    /// Trials that ended below zero
    pub broken: u64,
    /// `broken / trials`
    pub broken_rate: f64,
    /// Number of distinct terminal balances
    pub distinct_outcomes: usize,
    /// Lowest terminal balance
    pub min_balance: Option<i64>,
    /// Highest terminal balance
    pub max_balance: Option<i64>,
}

impl RaceStatistics {
    /// Broken rate as a percentage
    pub fn broken_percent(&self) -> f64 {
        self.broken_rate * 100.0
    }

    /// Whether any trial ended below zero
    pub fn is_broken(&self) -> bool {
        self.broken > 0
    }
}

/// Summarize a histogram
pub fn summarize(histogram: &OutcomeHistogram) -> RaceStatistics {
    RaceStatistics {
        trials: histogram.total(),
        broken: histogram.broken_count(),
        broken_rate: histogram.broken_rate(),
        distinct_outcomes: histogram.distinct(),
        min_balance: histogram.min_balance(),
        max_balance: histogram.max_balance(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_race_outcomes() {
        let mut h = OutcomeHistogram::new();
        h.extend(std::iter::repeat_n(30_000, 199));
        h.record(-40_000);

        let stats = summarize(&h);
        assert_eq!(stats.trials, 200);
        assert_eq!(stats.broken, 1);
        assert!(stats.is_broken());
        assert!((stats.broken_percent() - 0.5).abs() < 1e-12);
        assert_eq!(stats.distinct_outcomes, 2);
        assert_eq!(stats.min_balance, Some(-40_000));
    }

    #[test]
    fn test_summarize_clean_run() {
        let h: OutcomeHistogram = std::iter::repeat_n(30_000, 10).collect();
        let stats = summarize(&h);
        assert!(!stats.is_broken());
        assert_eq!(stats.broken_rate, 0.0);
    }
}
