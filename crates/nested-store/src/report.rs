use std::path::PathBuf;

use nested_types::GroupPath;

use crate::error::StoreError;

/// Outcome of a compaction sweep over every known group.
#[derive(Debug, Default)]
pub struct CompactionReport {
    /// Groups converted to archives by this sweep.
    pub compacted: Vec<GroupPath>,
    /// Groups left alone: not full, or already archived.
    pub skipped: usize,
    /// Groups whose compaction failed. The sweep continued past them.
    pub failed: Vec<(GroupPath, StoreError)>,
}

impl CompactionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Whether a validation sweep stops at the first invalid group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValidationMode {
    #[default]
    CollectAll,
    FailFast,
}

/// Per-group outcome of a validation sweep, in group order.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub results: Vec<(GroupPath, Result<(), StoreError>)>,
}

impl ValidationReport {
    /// Invalid groups with the reason each failed.
    pub fn invalid(&self) -> impl Iterator<Item = (&GroupPath, &StoreError)> {
        self.results
            .iter()
            .filter_map(|(path, result)| result.as_ref().err().map(|e| (path, e)))
    }

    pub fn is_valid(&self) -> bool {
        self.results.iter().all(|(_, result)| result.is_ok())
    }

    /// Number of groups checked.
    pub fn checked(&self) -> usize {
        self.results.len()
    }
}

/// Outcome of ingesting an external tree of object files.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Number of objects stored.
    pub ingested: usize,
    /// Files left in place, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}
