#![warn(missing_docs)]
//! racebench Statistics
//!
//! Point estimates for both experiments:
//! - `OutcomeHistogram`: terminal balances of race trials and their counts
//! - `RaceStatistics`: broken count, broken rate and outcome spread
//! - `speedup`: baseline elapsed over model elapsed
//!
//! No confidence intervals; every figure is a count or a ratio.

mod histogram;
mod speedup;
mod summary;

pub use histogram::OutcomeHistogram;
pub use speedup::{SpeedupEntry, compute_speedups, speedup};
pub use summary::{RaceStatistics, summarize};

/// Number of most frequent outcomes shown by default
pub const DEFAULT_TOP_OUTCOMES: usize = 5;
