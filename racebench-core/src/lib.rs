#![warn(missing_docs)]
//! racebench Core - Experiment Building Blocks
//!
//! This crate provides the pieces both experiments are assembled from:
//! - `Range` and `partition` for deterministic work splitting
//! - the `Workload` trait with a CPU-bound and a sleep-bound workload
//! - `SharedAccount` with unguarded and mutex-guarded withdrawals
//! - `CooperativeScheduler`, a single-threaded timer-driven task scheduler
//! - `WorkerMain`, the entry point of a process-pool worker

mod account;
mod error;
mod range;
mod scheduler;
mod worker;
mod workload;

pub use account::{SharedAccount, WithdrawalPolicy};
pub use error::{HarnessError, WorkloadError, panic_message};
pub use range::{Chunk, Range, partition, validate_count};
pub use scheduler::{CooperativeScheduler, SchedulerRun, Sleep, TimerHandle};
pub use worker::WorkerMain;
pub use workload::{PrimeCount, SleepTasks, Workload, apply_chunk, is_prime, workload_from_spec};
