use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identifier {0:?}: expected a non-negative decimal integer")]
    InvalidIdentifier(String),

    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("unsupported numeric base {0}: only base 10 is supported")]
    UnsupportedBase(u32),

    #[error("invalid group path {path:?}: {reason}")]
    InvalidGroupPath { path: String, reason: String },
}
