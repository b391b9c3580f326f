//! Group archive format for the nested filestore.
//!
//! A compacted group is a gzip-compressed tar file (`.tgz`) that any stock
//! `tar` can extract. Archives written here compress every tar entry into its
//! own gzip member, so a single member can be read without inflating the
//! members before it.
//!
//! # Architecture
//!
//! - **ArchiveWriter**: builds an archive member by member, one gzip block each
//! - **ArchiveIndex**: member name → block offset table built by scanning
//! - **ArchiveReader**: random-access member reads through the index
//!
//! Archives produced by other tools (one gzip stream for the whole tar) are
//! still readable; their members are located by inflating the stream once.

pub mod entry;
pub mod error;
pub mod index;
pub mod reader;
pub mod writer;

pub use entry::{MemberLocation, BLOCK_SIZE_SUBFIELD};
pub use error::{ArchiveError, ArchiveResult};
pub use index::ArchiveIndex;
pub use reader::ArchiveReader;
pub use writer::{ArchiveFile, ArchiveWriter};
