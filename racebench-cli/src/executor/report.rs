//! Report Building
//!
//! Converts runner outcomes into the serializable report sections shared by
//! the JSON and human-readable outputs.

use super::benchmark::BenchmarkOutcome;
use super::trials::{TrialConfig, TrialReport};
use racebench_core::Range;
use racebench_report::{BenchmarkSection, ModelEntry, OutcomeEntry, RaceSection};
use std::time::Duration;

/// Parameters a benchmark ran with
#[derive(Debug, Clone)]
pub struct BenchmarkParams {
    /// Workload name
    pub workload: String,
    /// Input range
    pub range: Range,
    /// Pool size
    pub workers: usize,
    /// Chunk count
    pub chunks: usize,
    /// Per-unit blocking interval, if any
    pub delay: Option<Duration>,
}

/// Build the benchmark section of a report
pub fn build_benchmark_section(params: &BenchmarkParams, outcome: &BenchmarkOutcome) -> BenchmarkSection {
    let speedups = outcome.speedups();

    let models = outcome
        .runs
        .iter()
        .enumerate()
        .map(|(index, run)| ModelEntry {
            model: run.model.clone(),
            value: run.value,
            elapsed_secs: run.elapsed.as_secs_f64(),
            speedup: index
                .checked_sub(1)
                .and_then(|i| speedups.get(i))
                .map(|s| s.ratio),
        })
        .collect();

    BenchmarkSection {
        workload: params.workload.clone(),
        start: params.range.start(),
        end: params.range.end(),
        workers: params.workers,
        chunks: params.chunks,
        delay_ms: params.delay.map(|d| d.as_nanos() as f64 / 1_000_000.0),
        baseline: outcome.baseline.clone(),
        models,
    }
}

/// Build one policy's race section, keeping the `top` most frequent outcomes
pub fn build_race_section(
    config: &TrialConfig,
    report: &TrialReport,
    top: usize,
    currency: &str,
) -> RaceSection {
    RaceSection {
        policy: report.policy,
        start_balance: config.start_balance,
        withdraw_amount: config.withdraw_amount,
        currency: currency.to_string(),
        statistics: report.statistics.clone(),
        elapsed_secs: report.elapsed.as_secs_f64(),
        top_outcomes: report
            .histogram
            .top(top)
            .into_iter()
            .map(|(balance, count)| OutcomeEntry { balance, count })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::benchmark::ModelRun;
    use racebench_core::WithdrawalPolicy;
    use racebench_stats::{OutcomeHistogram, summarize};

    #[test]
    fn test_benchmark_section_speedups() {
        let outcome = BenchmarkOutcome {
            baseline: "single".to_string(),
            runs: vec![
                ModelRun {
                    model: "single".to_string(),
                    value: 10,
                    elapsed: Duration::from_millis(400),
                },
                ModelRun {
                    model: "threads".to_string(),
                    value: 10,
                    elapsed: Duration::from_millis(100),
                },
            ],
        };
        let params = BenchmarkParams {
            workload: "sleep-tasks".to_string(),
            range: Range::new(0, 10).unwrap(),
            workers: 4,
            chunks: 10,
            delay: Some(Duration::from_millis(10)),
        };

        let section = build_benchmark_section(&params, &outcome);
        assert_eq!(section.models.len(), 2);
        assert_eq!(section.models[0].speedup, None);
        assert!((section.models[1].speedup.unwrap() - 4.0).abs() < 1e-9);
        assert!((section.delay_ms.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_race_section_top_outcomes() {
        let histogram: OutcomeHistogram = [30_000, 30_000, -40_000].into_iter().collect();
        let report = TrialReport {
            policy: WithdrawalPolicy::Unguarded,
            statistics: summarize(&histogram),
            histogram,
            elapsed: Duration::from_millis(5),
        };
        let config = TrialConfig::new(3, 100_000, 70_000).unwrap();

        let section = build_race_section(&config, &report, 1, "PLN");
        assert_eq!(
            section.top_outcomes,
            vec![OutcomeEntry {
                balance: 30_000,
                count: 2
            }]
        );
        assert_eq!(section.statistics.broken, 1);
    }
}
