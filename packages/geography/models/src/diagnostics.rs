//! Skip-and-continue counters.
//!
//! Every recoverable condition the pipeline tolerates (a dropped sample,
//! a malformed record, an optional layer that is missing, a station with
//! no metadata) is tallied here so a run can report how much it skipped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Category of a tolerated condition.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiagnosticKind {
    /// An optional layer is absent or sparse and was left out.
    PartialData,
    /// A malformed raw record (bad coordinate, non-numeric field) was skipped.
    Parse,
    /// A layer had zero variance and normalized to all zeros.
    DegenerateDistribution,
    /// A station had no matching metadata record.
    UnmatchedStation,
    /// A sample fell outside every region polygon.
    UnassignedSample,
    /// A boundary feature had no usable code or geometry.
    InvalidBoundary,
}

/// Aggregated counts per [`DiagnosticKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    counts: BTreeMap<DiagnosticKind, u64>,
}

impl Diagnostics {
    /// Creates an empty set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` occurrences of `kind`. Zero is ignored.
    pub fn record(&mut self, kind: DiagnosticKind, n: u64) {
        if n > 0 {
            *self.counts.entry(kind).or_insert(0) += n;
        }
    }

    /// Returns the count recorded for `kind`.
    #[must_use]
    pub fn count(&self, kind: DiagnosticKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Folds another set of counters into this one.
    pub fn merge(&mut self, other: &Self) {
        for (kind, n) in &other.counts {
            self.record(*kind, *n);
        }
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterates non-zero counters in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (DiagnosticKind, u64)> + '_ {
        self.counts.iter().map(|(k, v)| (*k, *v))
    }
}
