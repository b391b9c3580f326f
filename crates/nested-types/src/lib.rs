//! Foundation types for the nested filestore.
//!
//! Every other crate in the workspace depends on `nested-types`. Nothing in
//! here touches the filesystem: these are the pure addressing rules that map
//! an identifier to the group that stores it.
//!
//! # Key Types
//!
//! - [`Identifier`] -- arbitrary-precision decimal object key
//! - [`Hierarchy`] -- digit widths and pad character of the shard layout
//! - [`GroupPath`] -- resolved group path plus its inclusive identifier range

pub mod error;
pub mod group_path;
pub mod hierarchy;
pub mod identifier;

pub use error::TypeError;
pub use group_path::{GroupPath, ARCHIVE_EXTENSION};
pub use hierarchy::{Hierarchy, HierarchyConfig, DECIMAL_BASE, DEFAULT_PAD, MAX_LEAF_WIDTH};
pub use identifier::{Identifier, OBJECT_EXTENSION};
