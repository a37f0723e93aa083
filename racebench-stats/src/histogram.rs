//! Outcome Histogram

use fxhash::FxHashMap;

/// Terminal balance -> number of trials that ended there.
///
/// Iteration order of the underlying map is irrelevant; every ordered view
/// goes through [`OutcomeHistogram::top`] or [`OutcomeHistogram::sorted`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeHistogram {
    counts: FxHashMap<i64, u64>,
}

impl OutcomeHistogram {
    /// Create an empty histogram
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one trial ending at `balance`
    pub fn record(&mut self, balance: i64) {
        *self.counts.entry(balance).or_insert(0) += 1;
    }

    /// Fold another histogram into this one
    pub fn merge(&mut self, other: &OutcomeHistogram) {
        for (&balance, &count) in &other.counts {
            *self.counts.entry(balance).or_insert(0) += count;
        }
    }

    /// Number of trials recorded
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Trials that ended at exactly `balance`
    pub fn count(&self, balance: i64) -> u64 {
        self.counts.get(&balance).copied().unwrap_or(0)
    }

    /// Number of distinct terminal balances
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Whether no trial has been recorded
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Trials whose terminal balance is negative
    pub fn broken_count(&self) -> u64 {
        self.counts
            .iter()
            .filter(|&(&balance, _)| balance < 0)
            .map(|(_, &count)| count)
            .sum()
    }

    /// `broken_count / total`, or 0 for an empty histogram
    pub fn broken_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.broken_count() as f64 / total as f64
    }

    /// Smallest terminal balance seen
    pub fn min_balance(&self) -> Option<i64> {
        self.counts.keys().min().copied()
    }

    /// Largest terminal balance seen
    pub fn max_balance(&self) -> Option<i64> {
        self.counts.keys().max().copied()
    }

    /// Every outcome, most frequent first; ties by balance ascending
    pub fn sorted(&self) -> Vec<(i64, u64)> {
        let mut entries: Vec<(i64, u64)> = self.counts.iter().map(|(&b, &c)| (b, c)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        entries
    }

    /// The `n` most frequent outcomes
    pub fn top(&self, n: usize) -> Vec<(i64, u64)> {
        let mut entries = self.sorted();
        entries.truncate(n);
        entries
    }
}

impl FromIterator<i64> for OutcomeHistogram {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        let mut histogram = OutcomeHistogram::new();
        for balance in iter {
            histogram.record(balance);
        }
        histogram
    }
}

impl Extend<i64> for OutcomeHistogram {
    fn extend<I: IntoIterator<Item = i64>>(&mut self, iter: I) {
        for balance in iter {
            self.record(balance);
        }
    }
}
