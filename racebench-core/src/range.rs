//! Work Ranges and Partitioning
//!
//! A `Range` is a half-open interval of work units. `partition` splits it
//! into contiguous chunks that tile the range exactly.

use crate::error::HarnessError;
use racebench_ipc::WireRange;
use serde::Serialize;
use std::fmt;

/// Half-open interval `[start, end)` of work units, `end >= start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Range {
    start: i64,
    end: i64,
}

/// A sub-range handed to one worker
pub type Chunk = Range;

impl Range {
    /// Create a range, rejecting `end < start`
    pub fn new(start: i64, end: i64) -> Result<Self, HarnessError> {
        if end < start {
            return Err(HarnessError::InvalidArgument(format!(
                "range end ({}) must be >= start ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Inclusive lower bound
    pub fn start(&self) -> i64 {
        self.start
    }

    /// Exclusive upper bound
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Number of units in the range
    pub fn len(&self) -> u64 {
        self.end.abs_diff(self.start)
    }

    /// Whether the range holds no units
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Iterate the units of the range in order
    pub fn units(&self) -> std::ops::Range<i64> {
        self.start..self.end
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

impl From<Range> for WireRange {
    fn from(range: Range) -> Self {
        WireRange {
            start: range.start,
            end: range.end,
        }
    }
}

impl TryFrom<WireRange> for Range {
    type Error = HarnessError;

    fn try_from(wire: WireRange) -> Result<Self, Self::Error> {
        Range::new(wire.start, wire.end)
    }
}

/// Split `range` into at most `chunk_count` contiguous chunks.
///
/// `step = max(1, len / chunk_count)`. Chunks are `step` units long except
/// the last, which also takes the remainder instead of leaving a short
/// trailing chunk. When `len < chunk_count` every unit becomes its own chunk.
/// An empty range yields no chunks.
pub fn partition(range: Range, chunk_count: usize) -> Result<Vec<Chunk>, HarnessError> {
    if chunk_count == 0 {
        return Err(HarnessError::InvalidArgument(
            "chunk count must be >= 1".to_string(),
        ));
    }

    let len = range.len();
    let step = (len / chunk_count as u64).max(1);
    let count = len.min(chunk_count as u64) as usize;
    let mut chunks = Vec::with_capacity(count);
    let mut start = range.start;

    for index in 0..count {
        // `step * (count - 1) <= len`, so the addition stays inside the range.
        let end = if index + 1 == count {
            range.end
        } else {
            start.saturating_add_unsigned(step)
        };
        chunks.push(Range { start, end });
        start = end;
    }

    Ok(chunks)
}

/// Validate a user-supplied count (workers, chunks, trials, tasks).
///
/// Counts arrive signed so that zero and negative values are reported as
/// `InvalidArgument` instead of being wrapped or clamped.
pub fn validate_count(name: &str, value: i64) -> Result<usize, HarnessError> {
    if value < 1 {
        return Err(HarnessError::InvalidArgument(format!(
            "{} must be >= 1 (got {})",
            name, value
        )));
    }
    usize::try_from(value)
        .map_err(|_| HarnessError::InvalidArgument(format!("{} is too large ({})", name, value)))
}
