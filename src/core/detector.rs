//! Change detection over watched-file timestamps.

use crate::sources::TimestampPair;

/// Remembers the last observed [`TimestampPair`] and reports renewals.
///
/// The unset initial state counts as changed, so the first poll always
/// loads a certificate even if the files predate the process.
#[derive(Debug, Default, Clone)]
pub struct ChangeDetector {
    last: Option<TimestampPair>,
}

impl ChangeDetector {
    /// Create a detector that has not observed anything yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `current` differs from the last observed pair in either component.
    pub fn changed(&self, current: &TimestampPair) -> bool {
        self.last.as_ref() != Some(current)
    }

    /// Record `current` and report whether it was a change.
    pub fn observe(&mut self, current: TimestampPair) -> bool {
        let changed = self.changed(&current);
        self.last = Some(current);
        changed
    }

    /// The last observed pair, if any.
    pub fn last(&self) -> Option<&TimestampPair> {
        self.last.as_ref()
    }
}
