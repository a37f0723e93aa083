//! Workloads
//!
//! A workload maps each unit of a `Range` to a value; execution models sum
//! those values over chunks. Two workloads ship with the harness:
//! - `PrimeCount`: pure computation, one unit per candidate integer
//! - `SleepTasks`: each unit blocks for a fixed interval (simulated I/O)

use crate::error::{HarnessError, WorkloadError, panic_message};
use crate::range::Range;
use racebench_ipc::WorkloadSpec;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

/// A unit-of-work function applied over ranges by every execution model.
pub trait Workload: Send + Sync {
    /// Short name used in logs and reports
    fn name(&self) -> &str;

    /// Value contributed by a single unit
    fn evaluate_unit(&self, unit: i64) -> Result<u64, WorkloadError>;

    /// Time each unit spends blocked before it is evaluated.
    ///
    /// `None` for compute-bound workloads. Blocking models sleep the thread
    /// for this long; the cooperative model suspends the task instead.
    fn blocking_interval(&self) -> Option<Duration> {
        None
    }

    /// Descriptor used to rebuild the workload inside a worker process.
    ///
    /// Workloads returning `None` cannot run under the process model.
    fn spec(&self) -> Option<WorkloadSpec> {
        None
    }

    /// Evaluate a whole chunk on the calling thread
    fn apply(&self, chunk: Range) -> Result<u64, WorkloadError> {
        let interval = self.blocking_interval();
        let mut total = 0u64;
        for unit in chunk.units() {
            if let Some(interval) = interval {
                std::thread::sleep(interval);
            }
            total += self.evaluate_unit(unit)?;
        }
        Ok(total)
    }
}

/// Apply `workload` to `chunk`, turning errors and panics into `WorkloadFailure`
pub fn apply_chunk(workload: &dyn Workload, chunk: Range) -> Result<u64, HarnessError> {
    match catch_unwind(AssertUnwindSafe(|| workload.apply(chunk))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(HarnessError::workload_failure(chunk, e.message)),
        Err(panic) => Err(HarnessError::workload_failure(
            chunk,
            format!("panicked: {}", panic_message(panic.as_ref())),
        )),
    }
}

/// Rebuild a workload from its wire descriptor
pub fn workload_from_spec(spec: WorkloadSpec) -> Box<dyn Workload> {
    match spec {
        WorkloadSpec::CountPrimes => Box::new(PrimeCount),
        WorkloadSpec::Sleep { delay_nanos } => Box::new(SleepTasks::new(Duration::from_nanos(
            delay_nanos,
        ))),
    }
}

/// Trial-division primality test
pub fn is_prime(n: i64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let limit = (n as u64).isqrt() as i64;
    let mut d = 3;
    while d <= limit {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

/// CPU-bound workload: counts the primes in a range
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimeCount;

impl Workload for PrimeCount {
    fn name(&self) -> &str {
        "count-primes"
    }

    fn evaluate_unit(&self, unit: i64) -> Result<u64, WorkloadError> {
        Ok(u64::from(is_prime(unit)))
    }

    fn spec(&self) -> Option<WorkloadSpec> {
        Some(WorkloadSpec::CountPrimes)
    }
}

/// Sleep-bound workload: every unit is one task that blocks for `delay`.
///
/// The aggregate value is the number of tasks that completed.
#[derive(Debug, Clone, Copy)]
pub struct SleepTasks {
    delay: Duration,
}

impl SleepTasks {
    /// Create a workload whose tasks each block for `delay`
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Per-task blocking interval
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Workload for SleepTasks {
    fn name(&self) -> &str {
        "sleep-tasks"
    }

    fn evaluate_unit(&self, _unit: i64) -> Result<u64, WorkloadError> {
        Ok(1)
    }

    fn blocking_interval(&self) -> Option<Duration> {
        Some(self.delay)
    }

    fn spec(&self) -> Option<WorkloadSpec> {
        Some(WorkloadSpec::Sleep {
            delay_nanos: self.delay.as_nanos().min(u128::from(u64::MAX)) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct FailsAt(i64);

    impl Workload for FailsAt {
        fn name(&self) -> &str {
            "fails-at"
        }

        fn evaluate_unit(&self, unit: i64) -> Result<u64, WorkloadError> {
            if unit == self.0 {
                Err(WorkloadError::new(format!("unit {} rejected", unit)))
            } else {
                Ok(1)
            }
        }
    }

    struct PanicsAt(i64);

    impl Workload for PanicsAt {
        fn name(&self) -> &str {
            "panics-at"
        }

        fn evaluate_unit(&self, unit: i64) -> Result<u64, WorkloadError> {
            assert_ne!(unit, self.0, "unit {} is cursed", unit);
            Ok(1)
        }
    }

    #[test]
    fn test_is_prime_small_values() {
        let primes: Vec<i64> = (-5..30).filter(|&n| is_prime(n)).collect();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert!(!is_prime(25));
        assert!(!is_prime(49));
        assert!(is_prime(7_919));
    }

    #[test]
    fn test_prime_count_below_50000() {
        let range = Range::new(2, 50_000).unwrap();
        assert_eq!(PrimeCount.apply(range).unwrap(), 5_133);
    }

    #[test]
    fn test_sleep_tasks_counts_units_and_blocks() {
        let workload = SleepTasks::new(Duration::from_millis(2));
        let start = Instant::now();
        let value = workload.apply(Range::new(0, 5).unwrap()).unwrap();
        assert_eq!(value, 5);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_apply_chunk_reports_error_with_chunk() {
        let chunk = Range::new(0, 10).unwrap();
        match apply_chunk(&FailsAt(4), chunk) {
            Err(HarnessError::WorkloadFailure { chunk: failed, message }) => {
                assert_eq!(failed, chunk);
                assert!(message.contains("unit 4"));
            }
            other => panic!("expected WorkloadFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_apply_chunk_catches_panic() {
        let chunk = Range::new(0, 3).unwrap();
        match apply_chunk(&PanicsAt(1), chunk) {
            Err(HarnessError::WorkloadFailure { message, .. }) => {
                assert!(message.starts_with("panicked:"));
            }
            other => panic!("expected WorkloadFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_spec_rebuilds_equivalent_workload() {
        let original = SleepTasks::new(Duration::from_micros(250));
        let rebuilt = workload_from_spec(original.spec().unwrap());
        assert_eq!(rebuilt.blocking_interval(), Some(Duration::from_micros(250)));
        assert_eq!(rebuilt.name(), "sleep-tasks");

        let primes = workload_from_spec(WorkloadSpec::CountPrimes);
        let range = Range::new(2, 100).unwrap();
        assert_eq!(primes.apply(range).unwrap(), 25);
    }
}
