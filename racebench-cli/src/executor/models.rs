//! Execution Models
//!
//! Four interchangeable strategies for running a workload over a range. All
//! of them return the sum of the workload over every unit, so their values
//! must agree for the same input.
//!
//! ```text
//!                 partition      dispatch                  aggregate
//! single          -              calling thread            -
//! threads         chunk_count    rayon pool (parallelism)  sum
//! processes       chunk_count    worker processes via IPC  sum
//! cooperative     chunk_count    one thread, timer-driven  sum
//! ```

use crate::supervisor::ProcessPool;
use racebench_core::{
    Chunk, CooperativeScheduler, HarnessError, Range, TimerHandle, Workload, apply_chunk,
    panic_message, partition,
};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;

/// A strategy for executing a workload over a range
pub trait ExecutionModel: Send + Sync {
    /// Label used in output ("single", "threads", ...)
    fn name(&self) -> &str;

    /// Whether speedups are measured against this model
    fn is_baseline(&self) -> bool {
        false
    }

    /// Sum of `workload` over `range`.
    ///
    /// `parallelism` sizes the worker pool and `chunk_count` bounds the
    /// number of chunks; models that do not partition ignore both.
    fn run(
        &self,
        range: Range,
        workload: &dyn Workload,
        parallelism: usize,
        chunk_count: usize,
    ) -> Result<u64, HarnessError>;
}

fn require_parallelism(parallelism: usize) -> Result<(), HarnessError> {
    if parallelism == 0 {
        return Err(HarnessError::InvalidArgument(
            "parallelism must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// Sum per-chunk results, surfacing the failure of the lowest chunk
fn sum_chunks<I>(results: I) -> Result<u64, HarnessError>
where
    I: IntoIterator<Item = Result<u64, HarnessError>>,
{
    results.into_iter().sum()
}

/// Whole range on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialModel;

impl ExecutionModel for SequentialModel {
    fn name(&self) -> &str {
        "single"
    }

    fn is_baseline(&self) -> bool {
        true
    }

    fn run(
        &self,
        range: Range,
        workload: &dyn Workload,
        _parallelism: usize,
        _chunk_count: usize,
    ) -> Result<u64, HarnessError> {
        apply_chunk(workload, range)
    }
}

/// One task per chunk on a fixed-size thread pool sharing the address space
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPoolModel;

impl ExecutionModel for ThreadPoolModel {
    fn name(&self) -> &str {
        "threads"
    }

    fn run(
        &self,
        range: Range,
        workload: &dyn Workload,
        parallelism: usize,
        chunk_count: usize,
    ) -> Result<u64, HarnessError> {
        require_parallelism(parallelism)?;
        let chunks = partition(range, chunk_count)?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(parallelism)
            .thread_name(|i| format!("racebench-thread-{}", i))
            .build()
            .map_err(|e| HarnessError::Pool(format!("Failed to build thread pool: {}", e)))?;

        // One job per chunk so a pool thread never batches two blocking chunks.
        let results: Vec<Result<u64, HarnessError>> = pool.install(|| {
            chunks
                .par_iter()
                .with_max_len(1)
                .map(|&chunk| apply_chunk(workload, chunk))
                .collect()
        });

        sum_chunks(results)
    }
}

/// One task per chunk in isolated worker processes
#[derive(Debug, Clone, Default)]
pub struct ProcessPoolModel {
    binary: Option<PathBuf>,
}

impl ProcessPoolModel {
    /// Workers re-execute the current binary
    pub fn new() -> Self {
        Self { binary: None }
    }

    /// Workers are spawned from `binary`, which must accept `--worker`
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(binary.into()),
        }
    }

    fn worker_binary(&self) -> Result<PathBuf, HarnessError> {
        match &self.binary {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe().map_err(|e| {
                HarnessError::Pool(format!("Cannot locate current executable: {}", e))
            }),
        }
    }
}

impl ExecutionModel for ProcessPoolModel {
    fn name(&self) -> &str {
        "processes"
    }

    fn run(
        &self,
        range: Range,
        workload: &dyn Workload,
        parallelism: usize,
        chunk_count: usize,
    ) -> Result<u64, HarnessError> {
        require_parallelism(parallelism)?;
        let Some(spec) = workload.spec() else {
            return Err(HarnessError::InvalidArgument(format!(
                "workload '{}' has no descriptor and cannot run in worker processes",
                workload.name()
            )));
        };
        let chunks = partition(range, chunk_count)?;

        let pool = ProcessPool::new(self.worker_binary()?, parallelism);
        let values = pool.evaluate(&chunks, spec)?;
        Ok(values.into_iter().sum())
    }
}

/// One cooperatively scheduled task per chunk on the calling thread.
///
/// Tasks suspend at each unit's blocking interval instead of sleeping, so
/// the intervals of all tasks overlap without any extra thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct CooperativeModel;

async fn cooperative_chunk(
    workload: &dyn Workload,
    chunk: Chunk,
    timers: TimerHandle,
) -> Result<u64, HarnessError> {
    let interval = workload.blocking_interval();
    let mut total = 0u64;
    for unit in chunk.units() {
        if let Some(interval) = interval {
            timers.sleep(interval).await;
        }
        match catch_unwind(AssertUnwindSafe(|| workload.evaluate_unit(unit))) {
            Ok(Ok(value)) => total += value,
            Ok(Err(e)) => return Err(HarnessError::workload_failure(chunk, e.message)),
            Err(panic) => {
                return Err(HarnessError::workload_failure(
                    chunk,
                    format!("panicked: {}", panic_message(panic.as_ref())),
                ));
            }
        }
    }
    Ok(total)
}

impl ExecutionModel for CooperativeModel {
    fn name(&self) -> &str {
        "cooperative"
    }

    fn run(
        &self,
        range: Range,
        workload: &dyn Workload,
        _parallelism: usize,
        chunk_count: usize,
    ) -> Result<u64, HarnessError> {
        let chunks = partition(range, chunk_count)?;

        let mut scheduler = CooperativeScheduler::new();
        let timers = scheduler.timers();
        for chunk in chunks {
            scheduler.spawn(cooperative_chunk(workload, chunk, timers.clone()));
        }

        let run = scheduler.run()?;
        sum_chunks(run.outputs)
    }
}

/// Every model, baseline first
pub fn all_models(worker_binary: Option<PathBuf>) -> Vec<Box<dyn ExecutionModel>> {
    let processes = match worker_binary {
        Some(path) => ProcessPoolModel::with_binary(path),
        None => ProcessPoolModel::new(),
    };
    vec![
        Box::new(SequentialModel),
        Box::new(ThreadPoolModel),
        Box::new(processes),
        Box::new(CooperativeModel),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use racebench_core::{PrimeCount, SleepTasks, WorkloadError};
    use std::time::{Duration, Instant};

    struct RejectsUnit(i64);

    impl Workload for RejectsUnit {
        fn name(&self) -> &str {
            "rejects-unit"
        }

        fn evaluate_unit(&self, unit: i64) -> Result<u64, WorkloadError> {
            if unit == self.0 {
                Err(WorkloadError::new("rejected"))
            } else {
                Ok(1)
            }
        }
    }

    fn in_process_models() -> Vec<Box<dyn ExecutionModel>> {
        vec![
            Box::new(SequentialModel),
            Box::new(ThreadPoolModel),
            Box::new(CooperativeModel),
        ]
    }

    #[test]
    fn test_in_process_models_agree_on_primes() {
        let range = Range::new(2, 50_000).unwrap();
        for model in in_process_models() {
            assert_eq!(model.run(range, &PrimeCount, 4, 16).unwrap(), 5_133, "{}", model.name());
        }
    }

    #[test]
    fn test_models_agree_on_sleep_tasks() {
        let range = Range::new(0, 40).unwrap();
        let workload = SleepTasks::new(Duration::from_millis(1));
        for model in in_process_models() {
            assert_eq!(model.run(range, &workload, 8, 40).unwrap(), 40, "{}", model.name());
        }
    }

    #[test]
    fn test_empty_range_sums_to_zero() {
        let range = Range::new(5, 5).unwrap();
        for model in in_process_models() {
            assert_eq!(model.run(range, &PrimeCount, 2, 4).unwrap(), 0);
        }
    }

    #[test]
    fn test_failure_names_chunk() {
        let range = Range::new(0, 100).unwrap();
        for model in in_process_models() {
            match model.run(range, &RejectsUnit(42), 4, 4) {
                Err(HarnessError::WorkloadFailure { chunk, message }) => {
                    assert!(chunk.units().contains(&42), "{}: {}", model.name(), chunk);
                    assert_eq!(message, "rejected");
                }
                other => panic!("{}: expected WorkloadFailure, got {:?}", model.name(), other),
            }
        }
    }

    #[test]
    fn test_zero_chunks_rejected() {
        let range = Range::new(0, 10).unwrap();
        assert!(matches!(
            ThreadPoolModel.run(range, &PrimeCount, 2, 0),
            Err(HarnessError::InvalidArgument(_))
        ));
        assert!(matches!(
            CooperativeModel.run(range, &PrimeCount, 2, 0),
            Err(HarnessError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let range = Range::new(0, 10).unwrap();
        assert!(matches!(
            ThreadPoolModel.run(range, &PrimeCount, 0, 4),
            Err(HarnessError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_process_model_needs_descriptor() {
        let range = Range::new(0, 10).unwrap();
        let model = ProcessPoolModel::with_binary("/nonexistent");
        assert!(matches!(
            model.run(range, &RejectsUnit(3), 2, 2),
            Err(HarnessError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_cooperative_overlaps_blocking() {
        let range = Range::new(0, 200).unwrap();
        let workload = SleepTasks::new(Duration::from_millis(10));
        let start = Instant::now();
        assert_eq!(CooperativeModel.run(range, &workload, 1, 200).unwrap(), 200);
        // Two seconds if the tasks slept one after another.
        assert!(start.elapsed() < Duration::from_millis(800));
    }

    #[test]
    fn test_only_sequential_is_baseline() {
        let baselines: Vec<_> = all_models(None)
            .iter()
            .filter(|m| m.is_baseline())
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(baselines, vec!["single"]);
    }
}
