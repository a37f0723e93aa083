//! Benchmark Runner
//!
//! Runs one workload under several execution models, checks that every model
//! produced the baseline's value and derives speedups from single-shot
//! wall-clock timings. No warm-up and no repetition.

use super::models::ExecutionModel;
use racebench_core::{HarnessError, Range, Workload};
use racebench_stats::{SpeedupEntry, compute_speedups};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Value and elapsed time of one model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRun {
    /// Model name
    pub model: String,
    /// Aggregate workload value
    pub value: u64,
    /// Wall-clock time of `run`
    pub elapsed: Duration,
}

/// Result of a consistent benchmark run
#[derive(Debug, Clone)]
pub struct BenchmarkOutcome {
    /// Name of the baseline model
    pub baseline: String,
    /// Every model run, baseline first, then in registration order
    pub runs: Vec<ModelRun>,
}

impl BenchmarkOutcome {
    /// The agreed aggregate value
    pub fn value(&self) -> u64 {
        self.runs.first().map(|r| r.value).unwrap_or(0)
    }

    /// Baseline elapsed time
    pub fn baseline_elapsed(&self) -> Duration {
        self.runs.first().map(|r| r.elapsed).unwrap_or_default()
    }

    /// Speedup of every non-baseline model
    pub fn speedups(&self) -> Vec<SpeedupEntry> {
        compute_speedups(
            self.baseline_elapsed(),
            self.runs
                .iter()
                .skip(1)
                .map(|r| (r.model.as_str(), r.elapsed)),
        )
    }
}

/// Times a set of execution models on the same input
pub struct BenchmarkRunner {
    models: Vec<Box<dyn ExecutionModel>>,
    parallelism: usize,
    chunk_count: usize,
}

impl BenchmarkRunner {
    /// Runner handing `parallelism` and `chunk_count` to every model
    pub fn new(parallelism: usize, chunk_count: usize) -> Self {
        Self {
            models: Vec::new(),
            parallelism,
            chunk_count,
        }
    }

    /// Add a model
    pub fn with_model(mut self, model: Box<dyn ExecutionModel>) -> Self {
        self.models.push(model);
        self
    }

    /// Add several models
    pub fn with_models(mut self, models: impl IntoIterator<Item = Box<dyn ExecutionModel>>) -> Self {
        self.models.extend(models);
        self
    }

    /// Names of the registered models
    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name()).collect()
    }

    /// Run every model once.
    ///
    /// Stops at the first model whose value differs from the baseline's
    /// with `InconsistentResult`; no outcome (and so no speedup) is produced.
    pub fn run(&self, range: Range, workload: &dyn Workload) -> Result<BenchmarkOutcome, HarnessError> {
        let Some(baseline_index) = self.models.iter().position(|m| m.is_baseline()) else {
            return Err(HarnessError::InvalidArgument(
                "no baseline execution model registered".to_string(),
            ));
        };
        let baseline = &self.models[baseline_index];

        info!(
            workload = workload.name(),
            range = %range,
            parallelism = self.parallelism,
            chunks = self.chunk_count,
            "starting benchmark"
        );

        let baseline_run = self.time_model(baseline.as_ref(), range, workload)?;
        let mut runs = vec![baseline_run];

        for (index, model) in self.models.iter().enumerate() {
            if index == baseline_index {
                continue;
            }
            let run = self.time_model(model.as_ref(), range, workload)?;
            if run.value != runs[0].value {
                return Err(HarnessError::InconsistentResult {
                    baseline: runs[0].model.clone(),
                    baseline_value: runs[0].value,
                    model: run.model,
                    value: run.value,
                });
            }
            runs.push(run);
        }

        Ok(BenchmarkOutcome {
            baseline: baseline.name().to_string(),
            runs,
        })
    }

    fn time_model(
        &self,
        model: &dyn ExecutionModel,
        range: Range,
        workload: &dyn Workload,
    ) -> Result<ModelRun, HarnessError> {
        debug!(model = model.name(), "running model");
        let start = Instant::now();
        let value = model.run(range, workload, self.parallelism, self.chunk_count)?;
        let elapsed = start.elapsed();
        info!(model = model.name(), value, ?elapsed, "model finished");

        Ok(ModelRun {
            model: model.name().to_string(),
            value,
            elapsed,
        })
    }
}
