//! Identifier → group path resolution.
//!
//! An identifier's trailing `leaf_width` digits select its slot inside a
//! group; the digits before them are cut into one zero-padded component per
//! directory level, least significant level first. For widths `[3, 3, 3]`,
//! `12345678` resolves to `/012/345`.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::TypeError;
use crate::hierarchy::Hierarchy;
use crate::identifier::Identifier;

/// File extension of a compacted group archive.
pub const ARCHIVE_EXTENSION: &str = "tgz";

/// Hierarchical path of one group, e.g. `/012/345`.
///
/// Ordering follows the numeric value of the path digits, so the first and
/// last paths of a sorted collection hold the smallest and largest ranges.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupPath {
    /// Path digits with pad characters read as `0`. Sort key.
    digits: String,
    path: String,
}

impl GroupPath {
    /// Resolve the group an identifier belongs to.
    ///
    /// Pure and deterministic. Digits left over after the most significant
    /// level are dropped, so identifiers wider than the hierarchy alias onto
    /// smaller ones; sizing the hierarchy is the caller's contract.
    pub fn resolve(id: &Identifier, hierarchy: &Hierarchy) -> Self {
        let digits = id.as_str();
        let pad = hierarchy.pad();
        let mut remaining = &digits[..digits.len().saturating_sub(hierarchy.leaf_width())];

        let mut components = Vec::with_capacity(hierarchy.levels().len());
        for &width in hierarchy.levels() {
            let (rest, tail) = remaining.split_at(remaining.len().saturating_sub(width));
            let mut component: String = std::iter::repeat(pad).take(width - tail.len()).collect();
            component.push_str(tail);
            components.push(component);
            remaining = rest;
        }
        components.reverse();
        Self::from_components(&components, pad)
    }

    /// Parse a path such as `/012/345` and check it against the hierarchy.
    pub fn parse(path: &str, hierarchy: &Hierarchy) -> Result<Self, TypeError> {
        let invalid = |reason: String| TypeError::InvalidGroupPath {
            path: path.to_string(),
            reason,
        };
        let body = path
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'".into()))?;
        let components: Vec<String> = body.split('/').map(str::to_string).collect();
        let levels = hierarchy.levels();
        if components.len() != levels.len() {
            return Err(invalid(format!(
                "expected {} components, found {}",
                levels.len(),
                components.len()
            )));
        }

        let pad = hierarchy.pad();
        // Path components run most significant first; levels run the other way.
        for (component, &width) in components.iter().zip(levels.iter().rev()) {
            if component.chars().count() != width {
                return Err(invalid(format!(
                    "component {component:?} is not {width} characters wide"
                )));
            }
            if !component.chars().all(|c| c.is_ascii_digit() || c == pad) {
                return Err(invalid(format!(
                    "component {component:?} contains non-digit characters"
                )));
            }
        }
        Ok(Self::from_components(&components, pad))
    }

    fn from_components(components: &[String], pad: char) -> Self {
        let digits = components
            .iter()
            .flat_map(|c| c.chars())
            .map(|c| if c == pad { '0' } else { c })
            .collect();
        Self {
            digits,
            path: format!("/{}", components.join("/")),
        }
    }

    /// The path string, with its leading `/`.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// The path without its leading `/`, as used for member names.
    pub fn relative(&self) -> &str {
        &self.path[1..]
    }

    /// Smallest identifier this group holds.
    pub fn bucket_min(&self, hierarchy: &Hierarchy) -> Identifier {
        let mut digits = self.digits.clone();
        digits.extend(std::iter::repeat('0').take(hierarchy.leaf_width()));
        Identifier::from_digits(&digits)
    }

    /// Largest identifier this group holds (inclusive).
    pub fn bucket_max(&self, hierarchy: &Hierarchy) -> Identifier {
        let mut digits = self.digits.clone();
        digits.extend(std::iter::repeat('9').take(hierarchy.leaf_width()));
        Identifier::from_digits(&digits)
    }

    /// True if `id` falls inside this group's inclusive range.
    pub fn contains(&self, id: &Identifier, hierarchy: &Hierarchy) -> bool {
        self.bucket_min(hierarchy) <= *id && *id <= self.bucket_max(hierarchy)
    }

    /// Directory backing the group while it is loose.
    pub fn dir_in(&self, root: &Path) -> PathBuf {
        root.join(self.relative())
    }

    /// Archive file backing the group once compacted.
    pub fn archive_in(&self, root: &Path) -> PathBuf {
        root.join(format!("{}.{ARCHIVE_EXTENSION}", self.relative()))
    }

    /// Name of an identifier's member inside the group archive.
    pub fn member_name(&self, id: &Identifier) -> String {
        format!("{}/{}", self.relative(), id.file_name())
    }
}

impl fmt::Debug for GroupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupPath({})", self.path)
    }
}

impl fmt::Display for GroupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}
