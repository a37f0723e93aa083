//! Configuration loading from racebench.toml
//!
//! Run defaults can be specified in a `racebench.toml` file. The file is
//! discovered by walking up from the current directory, or passed explicitly
//! with `--config`. Command-line flags override file values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the discovered configuration file
pub const CONFIG_FILE_NAME: &str = "racebench.toml";

/// racebench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RacebenchConfig {
    /// Shared execution-model settings
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    /// CPU-bound benchmark defaults
    #[serde(default)]
    pub cpu: CpuConfig,
    /// I/O-bound benchmark defaults
    #[serde(default)]
    pub io: IoConfig,
    /// Race demonstrator defaults
    #[serde(default)]
    pub race: RaceConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Settings shared by both benchmarks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Worker pool size; defaults to the available CPU parallelism
    #[serde(default)]
    pub workers: Option<i64>,
    /// Auto chunk count is `chunk_multiplier × workers`
    #[serde(default = "default_chunk_multiplier")]
    pub chunk_multiplier: i64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            workers: None,
            chunk_multiplier: default_chunk_multiplier(),
        }
    }
}

fn default_chunk_multiplier() -> i64 {
    4
}

/// CPU-bound benchmark defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuConfig {
    /// First integer tested
    #[serde(default = "default_cpu_start")]
    pub start: i64,
    /// End of the tested range (exclusive)
    #[serde(default = "default_cpu_end")]
    pub end: i64,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            start: default_cpu_start(),
            end: default_cpu_end(),
        }
    }
}

fn default_cpu_start() -> i64 {
    2
}
fn default_cpu_end() -> i64 {
    200_000
}

/// I/O-bound benchmark defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoConfig {
    /// Number of sleeping tasks
    #[serde(default = "default_io_tasks")]
    pub tasks: i64,
    /// Blocking interval per task (e.g. "10ms")
    #[serde(default = "default_io_delay")]
    pub delay: String,
    /// Thread and process pool size for this benchmark
    #[serde(default = "default_io_workers")]
    pub workers: i64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            tasks: default_io_tasks(),
            delay: default_io_delay(),
            workers: default_io_workers(),
        }
    }
}

fn default_io_tasks() -> i64 {
    500
}
fn default_io_delay() -> String {
    "10ms".to_string()
}
fn default_io_workers() -> i64 {
    100
}

/// Race demonstrator defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceConfig {
    /// Trials per policy
    #[serde(default = "default_trials")]
    pub trials: i64,
    /// Starting balance in subunits
    #[serde(default = "default_start_balance")]
    pub start_balance: i64,
    /// Amount each withdrawer tries to take, in subunits
    #[serde(default = "default_withdraw_amount")]
    pub withdraw_amount: i64,
    /// Number of outcomes listed per policy
    #[serde(default = "default_top_outcomes")]
    pub top_outcomes: usize,
    /// Trials run concurrently
    #[serde(default = "default_jobs")]
    pub jobs: i64,
    /// Currency code used when printing balances
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Show a progress bar over trials
    #[serde(default = "default_progress")]
    pub progress: bool,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            trials: default_trials(),
            start_balance: default_start_balance(),
            withdraw_amount: default_withdraw_amount(),
            top_outcomes: default_top_outcomes(),
            jobs: default_jobs(),
            currency: default_currency(),
            progress: default_progress(),
        }
    }
}

fn default_trials() -> i64 {
    20_000
}
fn default_start_balance() -> i64 {
    100_000
}
fn default_withdraw_amount() -> i64 {
    70_000
}
fn default_top_outcomes() -> usize {
    racebench_stats::DEFAULT_TOP_OUTCOMES
}
fn default_jobs() -> i64 {
    1
}
fn default_currency() -> String {
    "PLN".to_string()
}
fn default_progress() -> bool {
    true
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: "human" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}

impl RacebenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Find `racebench.toml` by walking up from `start`
    pub fn find_from(start: impl Into<PathBuf>) -> Option<PathBuf> {
        let mut dir = start.into();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.is_file() {
                return Some(config_path);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Try to discover and load configuration by walking up from the current directory
    pub fn discover() -> anyhow::Result<Option<(PathBuf, Self)>> {
        let Ok(cwd) = std::env::current_dir() else {
            return Ok(None);
        };
        match Self::find_from(cwd) {
            Some(path) => {
                let config = Self::load(&path)?;
                Ok(Some((path, config)))
            }
            None => Ok(None),
        }
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# racebench configuration

[benchmark]
# Worker pool size (defaults to available CPU parallelism)
# workers = 8
# Auto chunk count (--chunks 0) is chunk_multiplier x workers
chunk_multiplier = 4

[cpu]
# Count primes in [start, end)
start = 2
end = 200000

[io]
# Number of sleeping tasks and the interval each one blocks for
tasks = 500
delay = "10ms"
workers = 100

[race]
trials = 20000
# Balances are in currency subunits
start_balance = 100000
withdraw_amount = 70000
top_outcomes = 5
# Trials run concurrently (each trial still has exactly two withdrawers)
jobs = 1
currency = "PLN"
progress = true

[output]
# human or json
format = "human"
"#
        .to_string()
    }

    /// Parse duration string (e.g., "10ms", "1.5s", "250us")
    pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        // Find where the number ends and unit begins
        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic() || *c == 'µ')
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if !value.is_finite() || value < 0.0 {
            return Err(anyhow::anyhow!("Duration must be non-negative: {}", s));
        }

        let nanos_per_unit: f64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1.0,
            "us" | "µs" => 1_000.0,
            "ms" => 1_000_000.0,
            "s" | "" => 1_000_000_000.0,
            "m" | "min" => 60_000_000_000.0,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok(Duration::from_nanos((value * nanos_per_unit) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RacebenchConfig::default();
        assert_eq!(config.benchmark.chunk_multiplier, 4);
        assert_eq!(config.cpu.start, 2);
        assert_eq!(config.cpu.end, 200_000);
        assert_eq!(config.io.delay, "10ms");
        assert_eq!(config.race.trials, 20_000);
        assert_eq!(config.race.start_balance, 100_000);
        assert_eq!(config.race.withdraw_amount, 70_000);
        assert_eq!(config.race.top_outcomes, 5);
        assert!(config.race.progress);
    }

    #[test]
    fn test_parse_duration() {
        let d = RacebenchConfig::parse_duration;
        assert_eq!(d("10ms").unwrap(), Duration::from_millis(10));
        assert_eq!(d("1.5s").unwrap(), Duration::from_millis(1_500));
        assert_eq!(d("250us").unwrap(), Duration::from_micros(250));
        assert_eq!(d("250µs").unwrap(), Duration::from_micros(250));
        assert_eq!(d("1000ns").unwrap(), Duration::from_nanos(1_000));
        assert_eq!(d("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(d("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(RacebenchConfig::parse_duration("").is_err());
        assert!(RacebenchConfig::parse_duration("fast").is_err());
        assert!(RacebenchConfig::parse_duration("10 parsecs").is_err());
        assert!(RacebenchConfig::parse_duration("-5ms").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [race]
            trials = 500
            currency = "EUR"

            [io]
            delay = "1ms"
        "#;

        let config: RacebenchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.race.trials, 500);
        assert_eq!(config.race.currency, "EUR");
        assert_eq!(config.io.delay, "1ms");
        // Defaults should still apply
        assert_eq!(config.race.withdraw_amount, 70_000);
        assert_eq!(config.output.format, "human");
    }

    #[test]
    fn test_default_toml_parses() {
        let config: RacebenchConfig = toml::from_str(&RacebenchConfig::default_toml()).unwrap();
        assert_eq!(config.io.tasks, 500);
        assert_eq!(config.benchmark.workers, None);
    }

    #[test]
    fn test_find_from_walks_up() {
        let root = std::env::temp_dir().join(format!("racebench-config-{}", std::process::id()));
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(CONFIG_FILE_NAME), "[cpu]\nend = 100\n").unwrap();

        let found = RacebenchConfig::find_from(&nested).unwrap();
        assert_eq!(found, root.join(CONFIG_FILE_NAME));
        assert_eq!(RacebenchConfig::load(&found).unwrap().cpu.end, 100);

        std::fs::remove_dir_all(&root).unwrap();
    }
}
