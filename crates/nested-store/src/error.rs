use std::io;
use std::path::{Path, PathBuf};

use nested_archive::ArchiveError;
use nested_types::{GroupPath, Identifier, TypeError};

/// Errors from filestore operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The identifier has no known group, or its group does not hold it.
    #[error("identifier {identifier} not found in group {group}")]
    NotFound {
        identifier: Identifier,
        group: GroupPath,
    },

    /// A put without `overwrite` targeted an identifier that is already stored.
    #[error("identifier {identifier} already exists at {}", .path.display())]
    AlreadyExists {
        identifier: Identifier,
        path: PathBuf,
    },

    /// Archived groups are immutable.
    #[error("cannot write {identifier}: group {group} is archived")]
    WriteToArchived {
        identifier: Identifier,
        group: GroupPath,
    },

    /// Compaction requested on a group that does not hold its full range.
    #[error("group {group} is not full: {count} of {capacity} items")]
    GroupNotFull {
        group: GroupPath,
        count: usize,
        capacity: u64,
    },

    /// The group directory holds object files that are not registered
    /// items, or the written archive does not hold one member per item. The
    /// source directory is left intact; a written archive must be removed by
    /// hand before retrying.
    #[error("compaction integrity check failed for {}: expected {expected} objects, found {actual}", .archive.display())]
    CompactionIntegrity {
        archive: PathBuf,
        expected: usize,
        actual: usize,
    },

    /// An archived group could not serve one of its identifiers.
    #[error("validation failed for {}{}: {reason}", .archive.display(), at_identifier(.identifier))]
    ValidationFailure {
        archive: PathBuf,
        identifier: Option<Identifier>,
        reason: String,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive error in {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn archive(path: &Path, source: ArchiveError) -> Self {
        Self::Archive {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True for errors that describe an expected condition rather than a
    /// broken store.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::AlreadyExists { .. }
                | Self::WriteToArchived { .. }
                | Self::GroupNotFull { .. }
        )
    }
}

fn at_identifier(identifier: &Option<Identifier>) -> String {
    identifier
        .as_ref()
        .map(|id| format!(" at {id}"))
        .unwrap_or_default()
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
