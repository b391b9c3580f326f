use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid gzip header at offset {offset}: {reason}")]
    InvalidHeader { offset: u64, reason: String },

    #[error("corrupt archive member at offset {offset}: {reason}")]
    CorruptMember { offset: u64, reason: String },

    #[error("member not found in archive: {0}")]
    MemberNotFound(String),

    #[error("invalid member name {0:?}")]
    InvalidMemberName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
