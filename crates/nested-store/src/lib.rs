//! Sharded on-disk object storage for the nested filestore.
//!
//! Objects are keyed by decimal identifiers and stored as
//! `{root}/{group}/{id}.bin`, where the group path comes from the identifier's
//! leading digits (see [`nested_types::GroupPath`]). Once a group holds every
//! identifier in its range it can be compacted into a single
//! `{root}/{group}.tgz` archive that still serves random-access reads.
//!
//! # Components
//!
//! - [`Item`] -- one object: where its bytes live and how to open them
//! - [`Group`] -- one shard, loose or archived; owns compaction and validation
//! - [`Index`] -- the catalog of groups, rebuilt by scanning the root
//! - [`Filestore`] -- the entry point, opened from a [`StoreConfig`]
//!
//! # Design Rules
//!
//! 1. The filesystem is the only source of truth; there is no catalog file.
//! 2. Write-then-publish: bytes are staged and renamed into place before the
//!    item is registered.
//! 3. Archived groups are immutable and assumed complete over their range.
//! 4. Compaction deletes source files only after the archive is verified.
//! 5. Compaction is maintenance work: reads against a group that is being
//!    compacted are not synchronized with it.

pub mod config;
pub mod error;
pub mod group;
pub mod index;
pub mod item;
pub mod report;
pub mod store;

pub use config::{RetryPolicy, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use group::{Group, GroupState};
pub use index::{Index, Missing, PutOptions, TransferMode};
pub use item::{Item, ItemReader, ItemWriter};
pub use report::{CompactionReport, IngestReport, ValidationMode, ValidationReport};
pub use store::Filestore;
