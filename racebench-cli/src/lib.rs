#![warn(missing_docs)]
//! racebench CLI Library
//!
//! Command-line driver for both experiments:
//! - `cpu`: prime counting under the sequential, thread-pool and process-pool models
//! - `io`: sleeping tasks under the sequential, thread-pool and cooperative models
//! - `race`: repeated two-withdrawer trials under the unguarded and guarded policies
//!
//! The same binary doubles as the process-pool worker when started with the
//! hidden `--worker` flag.
//!
//! # Example
//!
//! ```ignore
//! fn main() -> anyhow::Result<()> {
//!     racebench_cli::run()
//! }
//! ```

mod config;
mod executor;
mod supervisor;

pub use config::*;
pub use executor::*;
pub use supervisor::*;

use clap::{Parser, Subcommand, ValueEnum};
use racebench_core::{
    HarnessError, PrimeCount, Range, SleepTasks, WithdrawalPolicy, WorkerMain, Workload,
    validate_count,
};
use racebench_report::{OutputFormat, Report, generate_json_report};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// racebench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "racebench")]
#[command(
    author,
    version,
    about = "racebench - execution-model benchmarks and a check-then-act race demonstrator"
)]
pub struct Cli {
    /// Experiment to run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output format: human, json
    #[arg(long, global = true)]
    pub format: Option<String>,

    /// Configuration file (default: racebench.toml found by walking up from the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Run only execution models whose name matches this regex (the baseline always runs)
    #[arg(long, global = true)]
    pub models: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Internal: Run as worker process (used by the process pool)
    #[arg(long, hide = true)]
    pub worker: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// CPU-bound benchmark: count primes in [start, end)
    Cpu {
        /// First integer tested
        #[arg(long, allow_negative_numbers = true)]
        start: Option<i64>,
        /// End of the range (exclusive)
        #[arg(long, allow_negative_numbers = true)]
        end: Option<i64>,
        /// Pool size for the parallel models
        #[arg(long, allow_negative_numbers = true)]
        workers: Option<i64>,
        /// Number of chunks; 0 = auto (chunk_multiplier x workers)
        #[arg(long, allow_negative_numbers = true)]
        chunks: Option<i64>,
    },
    /// I/O-bound benchmark: tasks that each block for a fixed delay
    Io {
        /// Number of tasks
        #[arg(long, allow_negative_numbers = true)]
        tasks: Option<i64>,
        /// Blocking interval per task in milliseconds
        #[arg(long = "delay-ms", alias = "delay_ms", allow_negative_numbers = true)]
        delay_ms: Option<f64>,
        /// Pool size for the parallel models
        #[arg(long, allow_negative_numbers = true)]
        workers: Option<i64>,
    },
    /// Race demonstrator: two concurrent withdrawals per trial
    Race {
        /// Trials per policy
        #[arg(long, allow_negative_numbers = true)]
        trials: Option<i64>,
        /// Which policies to run
        #[arg(long, value_enum, default_value_t = RaceMode::Both)]
        mode: RaceMode,
        /// Starting balance in subunits
        #[arg(long, allow_negative_numbers = true)]
        start_balance: Option<i64>,
        /// Amount each withdrawer asks for, in subunits
        #[arg(long, allow_negative_numbers = true)]
        withdraw: Option<i64>,
        /// Trials run concurrently
        #[arg(long, allow_negative_numbers = true)]
        jobs: Option<i64>,
        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// Print a default racebench.toml
    Init,
}

/// Policy selection for the race demonstrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RaceMode {
    /// Unguarded only
    Unguarded,
    /// Guarded only
    Guarded,
    /// Unguarded, then guarded
    Both,
}

impl RaceMode {
    /// Policies to run, in order
    pub fn policies(self) -> Vec<WithdrawalPolicy> {
        match self {
            RaceMode::Unguarded => vec![WithdrawalPolicy::Unguarded],
            RaceMode::Guarded => vec![WithdrawalPolicy::Guarded],
            RaceMode::Both => WithdrawalPolicy::ALL.to_vec(),
        }
    }
}

/// Run the racebench CLI with the process arguments.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the racebench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // Handle worker mode first (before any other initialization)
    if cli.worker {
        return run_worker_mode();
    }

    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let format: OutputFormat = cli
        .format
        .as_deref()
        .unwrap_or(&config.output.format)
        .parse()
        .map_err(anyhow::Error::msg)?;

    match cli.command {
        Some(Commands::Cpu {
            start,
            end,
            workers,
            chunks,
        }) => {
            let workers = resolve_workers(workers.or(config.benchmark.workers))?;
            let range = Range::new(
                start.unwrap_or(config.cpu.start),
                end.unwrap_or(config.cpu.end),
            )?;
            let chunks = resolve_chunks(chunks.unwrap_or(0), workers, &config)?;
            let params = BenchmarkParams {
                workload: PrimeCount.name().to_string(),
                range,
                workers,
                chunks,
                delay: None,
            };
            let models = select_models(cli.models.as_deref(), &["single", "threads", "processes"])?;
            run_benchmark(&params, &PrimeCount, models, format)
        }
        Some(Commands::Io {
            tasks,
            delay_ms,
            workers,
        }) => {
            let tasks = validate_count("tasks", tasks.unwrap_or(config.io.tasks))?;
            let workers = validate_count("workers", workers.unwrap_or(config.io.workers))?;
            let delay = match delay_ms {
                Some(ms) => delay_from_millis(ms)?,
                None => RacebenchConfig::parse_duration(&config.io.delay)?,
            };
            let range = Range::new(0, tasks as i64)?;
            // One chunk per task.
            let params = BenchmarkParams {
                workload: "sleep-tasks".to_string(),
                range,
                workers,
                chunks: tasks,
                delay: Some(delay),
            };
            let models =
                select_models(cli.models.as_deref(), &["single", "threads", "cooperative"])?;
            run_benchmark(&params, &SleepTasks::new(delay), models, format)
        }
        Some(Commands::Race {
            trials,
            mode,
            start_balance,
            withdraw,
            jobs,
            no_progress,
        }) => {
            let trial_config = TrialConfig::new(
                trials.unwrap_or(config.race.trials),
                start_balance.unwrap_or(config.race.start_balance),
                withdraw.unwrap_or(config.race.withdraw_amount),
            )?
            .with_jobs(jobs.unwrap_or(config.race.jobs))?;
            let show_progress =
                config.race.progress && !no_progress && format == OutputFormat::Human;
            run_race(&trial_config, mode, show_progress, &config.race, format)
        }
        Some(Commands::Init) => {
            print!("{}", RacebenchConfig::default_toml());
            Ok(())
        }
        None => Err(anyhow::anyhow!(
            "no command given; try `racebench --help`"
        )),
    }
}

/// Run as a worker process (IPC mode)
fn run_worker_mode() -> anyhow::Result<()> {
    let mut worker = WorkerMain::new();
    worker
        .run()
        .map_err(|e| anyhow::anyhow!("Worker error: {}", e))
}

/// Logs go to stderr so stdout carries only the report
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "racebench=debug"
    } else {
        "racebench=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<RacebenchConfig> {
    if let Some(path) = explicit {
        info!(path = %path.display(), "loading configuration");
        return RacebenchConfig::load(path)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e));
    }
    match RacebenchConfig::discover()? {
        Some((path, config)) => {
            info!(path = %path.display(), "discovered configuration");
            Ok(config)
        }
        None => Ok(RacebenchConfig::default()),
    }
}

/// Non-negative, finite and representable as a `Duration`
fn delay_from_millis(ms: f64) -> Result<Duration, HarnessError> {
    Duration::try_from_secs_f64(ms / 1_000.0).map_err(|e| {
        HarnessError::InvalidArgument(format!(
            "delay must be a non-negative number of milliseconds (got {}): {}",
            ms, e
        ))
    })
}

fn resolve_workers(workers: Option<i64>) -> Result<usize, HarnessError> {
    match workers {
        Some(n) => validate_count("workers", n),
        None => Ok(num_cpus() as usize),
    }
}

/// `0` selects `chunk_multiplier × workers`; negative counts are rejected
fn resolve_chunks(
    chunks: i64,
    workers: usize,
    config: &RacebenchConfig,
) -> Result<usize, HarnessError> {
    if chunks != 0 {
        return validate_count("chunks", chunks);
    }
    let multiplier = validate_count("chunk_multiplier", config.benchmark.chunk_multiplier)?;
    multiplier.checked_mul(workers).ok_or_else(|| {
        HarnessError::InvalidArgument(format!(
            "auto chunk count overflows ({} x {})",
            multiplier, workers
        ))
    })
}

/// Models named in `defaults`, or every model matching `pattern`; the baseline is always kept
fn select_models(
    pattern: Option<&str>,
    defaults: &[&str],
) -> anyhow::Result<Vec<Box<dyn ExecutionModel>>> {
    let filter = pattern
        .map(Regex::new)
        .transpose()
        .map_err(|e| HarnessError::InvalidArgument(format!("invalid --models pattern: {}", e)))?;

    Ok(all_models(None)
        .into_iter()
        .filter(|m| {
            m.is_baseline()
                || match &filter {
                    Some(re) => re.is_match(m.name()),
                    None => defaults.contains(&m.name()),
                }
        })
        .collect())
}

fn run_benchmark(
    params: &BenchmarkParams,
    workload: &dyn Workload,
    models: Vec<Box<dyn ExecutionModel>>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let runner = BenchmarkRunner::new(params.workers, params.chunks).with_models(models);
    info!(models = ?runner.model_names(), "selected execution models");

    let outcome = runner.run(params.range, workload)?;

    let mut report = Report::new(build_report_meta());
    report.benchmark = Some(build_benchmark_section(params, &outcome));
    emit(&report, format)
}

fn run_race(
    trial_config: &TrialConfig,
    mode: RaceMode,
    show_progress: bool,
    race_config: &RaceConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let runner = RaceTrialRunner::new(*trial_config).with_progress(show_progress);
    let mut report = Report::new(build_report_meta());

    for policy in mode.policies() {
        match runner.run(policy) {
            Ok(trials) => report.race.push(build_race_section(
                trial_config,
                &trials,
                race_config.top_outcomes,
                &race_config.currency,
            )),
            Err(e) => {
                // Keep the sections that did finish, then fail the run.
                if !report.race.is_empty() {
                    emit(&report, format)?;
                }
                warn!(%policy, "trial run failed");
                return Err(e.into());
            }
        }
    }

    emit(&report, format)
}

fn emit(report: &Report, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Human => print!("{}", format_human_output(report)),
        OutputFormat::Json => println!("{}", generate_json_report(report)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_negative_chunks() {
        let cli = Cli::try_parse_from(["racebench", "cpu", "--chunks", "-1"]).unwrap();
        match cli.command {
            Some(Commands::Cpu { chunks, .. }) => assert_eq!(chunks, Some(-1)),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_delay_from_millis() {
        let delay = delay_from_millis(2.5).unwrap();
        assert!((delay.as_secs_f64() - 0.0025).abs() < 1e-9, "{:?}", delay);
        assert_eq!(delay_from_millis(0.0).unwrap(), Duration::ZERO);
        for bad in [-1.0, 1e300, f64::NAN, f64::INFINITY] {
            assert!(
                matches!(delay_from_millis(bad), Err(HarnessError::InvalidArgument(_))),
                "{} accepted",
                bad
            );
        }
    }

    #[test]
    fn test_parse_delay_alias() {
        let cli = Cli::try_parse_from(["racebench", "io", "--delay_ms", "2.5"]).unwrap();
        match cli.command {
            Some(Commands::Io { delay_ms, .. }) => assert_eq!(delay_ms, Some(2.5)),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["racebench", "race", "--mode", "guarded", "--format", "json"])
                .unwrap();
        assert_eq!(cli.format.as_deref(), Some("json"));
        assert!(matches!(
            cli.command,
            Some(Commands::Race {
                mode: RaceMode::Guarded,
                ..
            })
        ));
    }

    #[test]
    fn test_worker_flag_parses_without_subcommand() {
        let cli = Cli::try_parse_from(["racebench", racebench_ipc::WORKER_FLAG]).unwrap();
        assert!(cli.worker);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_resolve_chunks() {
        let config = RacebenchConfig::default();
        assert_eq!(resolve_chunks(0, 8, &config).unwrap(), 32);
        assert_eq!(resolve_chunks(5, 8, &config).unwrap(), 5);
        assert!(matches!(
            resolve_chunks(-1, 8, &config),
            Err(HarnessError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_resolve_workers() {
        assert_eq!(resolve_workers(Some(3)).unwrap(), 3);
        assert!(resolve_workers(Some(0)).is_err());
        assert!(resolve_workers(None).unwrap() >= 1);
    }

    #[test]
    fn test_select_models() {
        let names = |models: Vec<Box<dyn ExecutionModel>>| {
            models
                .iter()
                .map(|m| m.name().to_string())
                .collect::<Vec<_>>()
        };

        let defaults = select_models(None, &["single", "threads", "cooperative"]).unwrap();
        assert_eq!(names(defaults), vec!["single", "threads", "cooperative"]);

        let filtered = select_models(Some("^proc"), &["single"]).unwrap();
        assert_eq!(names(filtered), vec!["single", "processes"]);

        assert!(select_models(Some("("), &[]).is_err());
    }

    #[test]
    fn test_race_mode_policies() {
        assert_eq!(
            RaceMode::Both.policies(),
            vec![WithdrawalPolicy::Unguarded, WithdrawalPolicy::Guarded]
        );
        assert_eq!(RaceMode::Guarded.policies(), vec![WithdrawalPolicy::Guarded]);
    }
}
