//! Report Data Structures

use chrono::{DateTime, Utc};
use racebench_core::WithdrawalPolicy;
use racebench_stats::RaceStatistics;
use serde::Serialize;

/// Complete run report; either section may be absent
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub meta: ReportMeta,
    pub benchmark: Option<BenchmarkSection>,
    pub race: Vec<RaceSection>,
}

impl Report {
    /// Empty report for `meta`
    pub fn new(meta: ReportMeta) -> Self {
        Self {
            meta,
            benchmark: None,
            race: Vec::new(),
        }
    }
}

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub schema_version: u32,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub system: SystemInfo,
}

/// System information
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub cpu: String,
    pub cpu_cores: u32,
}

/// One workload run under every selected execution model
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkSection {
    /// Workload name
    pub workload: String,
    /// First unit of the range
    pub start: i64,
    /// End of the range (exclusive)
    pub end: i64,
    /// Pool size handed to the parallel models
    pub workers: usize,
    /// Chunk count handed to the parallel models
    pub chunks: usize,
    /// Per-unit blocking interval for sleep-bound workloads, in milliseconds
    pub delay_ms: Option<f64>,
    /// Name of the baseline model
    pub baseline: String,
    /// Results in execution order, baseline first
    pub models: Vec<ModelEntry>,
}

/// Result of one execution model
#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    /// Model name
    pub model: String,
    /// Aggregate workload value
    pub value: u64,
    /// Wall-clock time in seconds
    pub elapsed_secs: f64,
    /// Baseline elapsed / model elapsed; `None` for the baseline itself
    pub speedup: Option<f64>,
}

/// Trials of one withdrawal policy
#[derive(Debug, Clone, Serialize)]
pub struct RaceSection {
    pub policy: WithdrawalPolicy,
    pub start_balance: i64,
    pub withdraw_amount: i64,
    pub currency: String,
    #[serde(flatten)]
    pub statistics: RaceStatistics,
    /// Wall-clock time of the trial loop in seconds
    pub elapsed_secs: f64,
    /// Most frequent terminal balances
    pub top_outcomes: Vec<OutcomeEntry>,
}

/// A terminal balance and how often it occurred
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeEntry {
    /// Balance in subunits
    pub balance: i64,
    /// Number of trials
    pub count: u64,
}
