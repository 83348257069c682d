//! Recursion budget for archive identification.

use crate::config::EngineConfig;

/// Limits carried through one top-level identification.
///
/// Depth is restored when a nested archive is left; entries are spent
/// across the whole tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Archive levels that may still be entered.
    pub remaining_depth: usize,
    /// Entries that may still be visited.
    pub remaining_entries: usize,
}

impl Budget {
    /// Create a budget.
    pub fn new(max_depth: usize, max_entries: usize) -> Self {
        Self {
            remaining_depth: max_depth,
            remaining_entries: max_entries,
        }
    }

    /// Budget for a top-level request.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_depth, config.max_entries)
    }

    /// Spend one entry. Returns false when none are left.
    pub fn take_entry(&mut self) -> bool {
        if self.remaining_entries == 0 {
            return false;
        }
        self.remaining_entries -= 1;
        true
    }

    /// Enter a nested archive. Returns false at the depth limit.
    pub fn descend(&mut self) -> bool {
        if self.remaining_depth == 0 {
            return false;
        }
        self.remaining_depth -= 1;
        true
    }

    /// Leave a nested archive entered with [`Budget::descend`].
    pub fn ascend(&mut self) {
        self.remaining_depth += 1;
    }
}
