//! Error taxonomy shared by every racebench component.
//!
//! All variants are deterministic-logic errors. Nothing here is retried.

use crate::account::WithdrawalPolicy;
use crate::range::Range;
use std::any::Any;
use thiserror::Error;

/// Errors surfaced by partitioning, execution models and the trial runner
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Bad partition, trial or amount argument; rejected before running
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A chunk task failed; the whole model run is discarded
    #[error("workload failed on chunk {chunk}: {message}")]
    WorkloadFailure { chunk: Range, message: String },

    /// Two execution models disagreed on the aggregate value
    #[error(
        "inconsistent result: {model} returned {value}, baseline {baseline} returned {baseline_value}"
    )]
    InconsistentResult {
        baseline: String,
        baseline_value: u64,
        model: String,
        value: u64,
    },

    /// A policy that must preserve `balance >= 0` did not
    #[error("invariant violated: {policy} policy ended below zero in {broken} of {trials} trials")]
    InvariantViolation {
        policy: WithdrawalPolicy,
        broken: u64,
        trials: u64,
    },

    /// The cooperative scheduler has pending tasks but nothing can wake them
    #[error("cooperative scheduler stalled with {pending} pending task(s) and no armed timer")]
    Stalled { pending: usize },

    /// Thread pool or worker process pool could not be driven
    #[error("worker pool error: {0}")]
    Pool(String),

    /// A withdrawer thread panicked instead of returning
    #[error("withdrawer thread panicked in trial {trial}")]
    WithdrawerPanicked { trial: usize },
}

impl HarnessError {
    /// Build a `WorkloadFailure` for `chunk`
    pub fn workload_failure(chunk: Range, message: impl Into<String>) -> Self {
        HarnessError::WorkloadFailure {
            chunk,
            message: message.into(),
        }
    }
}

/// Error returned by a workload while evaluating one unit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct WorkloadError {
    /// What went wrong
    pub message: String,
}

impl WorkloadError {
    /// Create a workload error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Extract a readable message from a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_failure_names_chunk() {
        let chunk = Range::new(10, 20).unwrap();
        let err = HarnessError::workload_failure(chunk, "boom");
        assert_eq!(err.to_string(), "workload failed on chunk [10, 20): boom");
    }

    #[test]
    fn test_panic_message_variants() {
        let payload = std::panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload = std::panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");

        let payload = std::panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "Unknown panic");
    }
}
