#![warn(missing_docs)]
//! # racebench
//!
//! Concurrency-model evaluation harness with two experiments:
//! - **Execution models**: the same CPU-bound or sleep-bound workload under
//!   sequential, thread-pool, process-pool and cooperative single-threaded
//!   execution, checked for identical results and compared by wall-clock speedup
//! - **Race demonstrator**: two concurrent check-then-act withdrawals per trial,
//!   unguarded and mutex-guarded, repeated many times to estimate how often the
//!   balance ends below zero
//!
//! ## Quick Start
//!
//! ```ignore
//! use racebench::prelude::*;
//!
//! let runner = BenchmarkRunner::new(4, 16)
//!     .with_model(Box::new(SequentialModel))
//!     .with_model(Box::new(ThreadPoolModel));
//! let outcome = runner.run(Range::new(2, 50_000)?, &PrimeCount)?;
//! assert_eq!(outcome.value(), 5_133);
//!
//! let histogram = run_trials(WithdrawalPolicy::Guarded, 10_000, 100_000, 70_000)?;
//! assert_eq!(histogram.broken_count(), 0);
//! ```

// Re-export core types
pub use racebench_core::{
    Chunk, CooperativeScheduler, HarnessError, PrimeCount, Range, SchedulerRun, SharedAccount,
    SleepTasks, TimerHandle, WithdrawalPolicy, Workload, WorkloadError, apply_chunk, is_prime,
    partition, validate_count,
};

// Re-export execution and trial APIs
pub use racebench_cli::{
    BenchmarkOutcome, BenchmarkRunner, CooperativeModel, ExecutionModel, ModelRun,
    ProcessPoolModel, RaceTrialRunner, RacebenchConfig, SequentialModel, ThreadPoolModel,
    TrialConfig, TrialReport, all_models, run, run_trial, run_trials, run_with_cli,
};

// Re-export stats
pub use racebench_stats::{OutcomeHistogram, RaceStatistics, speedup, summarize};

// Re-export report output
pub use racebench_report::{OutputFormat, Report, format_currency, generate_json_report};

/// Worker protocol constants
pub mod ipc {
    pub use racebench_ipc::{IPC_FD_ENV, PROTOCOL_VERSION, WORKER_FLAG};
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BenchmarkRunner, CooperativeModel, ExecutionModel, HarnessError, PrimeCount,
        ProcessPoolModel, Range, SequentialModel, SleepTasks, ThreadPoolModel, WithdrawalPolicy,
        Workload, run_trials,
    };
}
