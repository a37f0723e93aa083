//! Output Formatting
//!
//! Human-readable output for both experiments:
//! - one line per execution model with its value and time
//! - speedup of each model over the baseline
//! - per-policy race summary with the most frequent outcomes

use racebench_core::WithdrawalPolicy;
use racebench_report::{BenchmarkSection, RaceSection, Report, format_currency};

/// Format a report for terminal display
pub fn format_human_output(report: &Report) -> String {
    let mut output = String::new();

    if let Some(benchmark) = &report.benchmark {
        output.push_str(&format_benchmark(benchmark));
    }

    for section in &report.race {
        output.push_str(&format_race_section(section));
    }

    // Only reachable when no guarded section raised an invariant violation.
    if report
        .race
        .iter()
        .any(|s| s.policy == WithdrawalPolicy::Guarded)
    {
        output.push_str("\nOK: guarded policy never broke the invariant.\n");
    }

    output
}

/// Header, one line per model, then speedups against the baseline
pub fn format_benchmark(section: &BenchmarkSection) -> String {
    let mut output = String::new();

    match section.delay_ms {
        Some(delay_ms) => {
            output.push_str("I/O-bound benchmark (simulated via sleep)\n");
            output.push_str(&format!(
                "tasks={}, delay={}ms, workers={}\n\n",
                section.end - section.start,
                delay_ms,
                section.workers
            ));
        }
        None => {
            output.push_str(&format!("CPU-bound benchmark ({})\n", section.workload));
            output.push_str(&format!(
                "range=[{}, {}), workers={}, chunks={}\n\n",
                section.start, section.end, section.workers, section.chunks
            ));
        }
    }

    for entry in &section.models {
        output.push_str(&format!(
            "{:<14}  result={:<8}  time={:.3}s\n",
            entry.model, entry.value, entry.elapsed_secs
        ));
    }

    let speedups: Vec<_> = section
        .models
        .iter()
        .filter_map(|e| e.speedup.map(|s| (e.model.as_str(), s)))
        .collect();
    if !speedups.is_empty() {
        let width = speedups.iter().map(|(m, _)| m.len()).max().unwrap_or(0);
        output.push_str(&format!("\nSpeedup vs {}:\n", section.baseline));
        for (model, ratio) in speedups {
            output.push_str(&format!("{:<width$} x{:.2}\n", model, ratio, width = width));
        }
    }

    output
}

/// One policy's trial summary
pub fn format_race_section(section: &RaceSection) -> String {
    let stats = &section.statistics;
    let mut output = String::new();

    output.push_str(&format!(
        "\n=== {} ({}) ===\n",
        section.policy.as_str().to_uppercase(),
        section.policy.description()
    ));
    output.push_str(&format!("Trials: {}\n", stats.trials));
    output.push_str(&format!("Invariant broken (final < 0): {}\n", stats.broken));
    output.push_str(&format!("Broken rate: {:.6}%\n", stats.broken_percent()));
    output.push_str(&format!("Time: {:.3}s\n", section.elapsed_secs));
    output.push_str("Top outcomes:\n");
    for outcome in &section.top_outcomes {
        output.push_str(&format!(
            "  {} ({} subunits): {}\n",
            format_currency(outcome.balance, &section.currency),
            outcome.balance,
            outcome.count
        ));
    }

    output
}
