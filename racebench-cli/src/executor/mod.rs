//! Experiment Executor
//!
//! Runs both experiments and turns their outcomes into reports.
//!
//! ## Pipeline Overview
//!
//! ```text
//!  Range + Workload                 TrialConfig + policy
//!        │                                 │
//!        ▼                                 ▼
//! ┌─────────────┐                  ┌───────────────┐
//! │   models    │ single/threads/  │    trials     │ fresh account,
//! │             │ processes/coop   │               │ two withdrawers
//! └──────┬──────┘                  └───────┬───────┘
//!        ▼                                 │
//! ┌─────────────┐                          │
//! │  benchmark  │ consistency check,       │
//! │             │ speedups                 │
//! └──────┬──────┘                          │
//!        └──────────────┬──────────────────┘
//!                       ▼
//!               ┌──────────────┐
//!               │    report    │  serializable sections
//!               └──────┬───────┘
//!                      ▼
//!               ┌──────────────┐
//!               │  formatting  │  human-readable output
//!               └──────────────┘
//! ```

mod benchmark;
mod formatting;
mod metadata;
mod models;
mod report;
mod trials;

pub use benchmark::{BenchmarkOutcome, BenchmarkRunner, ModelRun};
pub use formatting::{format_benchmark, format_human_output, format_race_section};
pub use metadata::{REPORT_SCHEMA_VERSION, build_report_meta, num_cpus};
pub use models::{
    CooperativeModel, ExecutionModel, ProcessPoolModel, SequentialModel, ThreadPoolModel,
    all_models,
};
pub use report::{BenchmarkParams, build_benchmark_section, build_race_section};
pub use trials::{
    RaceTrialRunner, TrialConfig, TrialReport, WITHDRAWERS_PER_TRIAL, run_trial, run_trials,
};
