#![warn(missing_docs)]
//! racebench Report - Result Model and Output
//!
//! Generates machine-readable output for both experiments and the currency
//! formatting shared with the human-readable terminal output.

mod currency;
mod json;
mod report;

pub use currency::{SUBUNITS_PER_UNIT, format_currency};
pub use json::generate_json_report;
pub use report::{
    BenchmarkSection, ModelEntry, OutcomeEntry, RaceSection, Report, ReportMeta, SystemInfo,
};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable terminal output
    #[default]
    Human,
    /// Pretty-printed JSON report
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}
