use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Default character used to left-pad short directory components.
pub const DEFAULT_PAD: char = '0';

/// The only numeric base the digit decomposition supports.
pub const DECIMAL_BASE: u32 = 10;

/// Largest leaf width whose capacity (`10^leaf_width`) fits in a `u64`.
pub const MAX_LEAF_WIDTH: usize = 18;

/// Digit-width hierarchy used to shard identifiers into groups.
///
/// `widths[0]` is the leaf width: the number of trailing digits that select
/// an object inside its group. The remaining widths are the directory levels,
/// ordered from the level nearest the leaf to the most significant one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hierarchy {
    widths: Vec<usize>,
    pad: char,
}

impl Hierarchy {
    /// Validate and build a hierarchy.
    pub fn new(widths: Vec<usize>, pad: char, base: u32) -> Result<Self, TypeError> {
        if base != DECIMAL_BASE {
            return Err(TypeError::UnsupportedBase(base));
        }
        if widths.len() < 2 {
            return Err(TypeError::InvalidHierarchy(format!(
                "need a leaf width and at least one directory level, got {widths:?}"
            )));
        }
        if widths.contains(&0) {
            return Err(TypeError::InvalidHierarchy(format!(
                "widths must be positive, got {widths:?}"
            )));
        }
        if widths[0] > MAX_LEAF_WIDTH {
            return Err(TypeError::InvalidHierarchy(format!(
                "leaf width {} exceeds {MAX_LEAF_WIDTH}",
                widths[0]
            )));
        }
        if matches!(pad, '/' | '\\' | '.' | '1'..='9') {
            return Err(TypeError::InvalidHierarchy(format!(
                "pad character {pad:?} is not allowed"
            )));
        }
        Ok(Self { widths, pad })
    }

    /// A base-10 hierarchy padded with `'0'`.
    pub fn decimal(widths: &[usize]) -> Result<Self, TypeError> {
        Self::new(widths.to_vec(), DEFAULT_PAD, DECIMAL_BASE)
    }

    pub fn widths(&self) -> &[usize] {
        &self.widths
    }

    /// Digits reserved for the position of an object inside its group.
    pub fn leaf_width(&self) -> usize {
        self.widths[0]
    }

    /// Directory level widths, nearest-to-leaf first.
    pub fn levels(&self) -> &[usize] {
        &self.widths[1..]
    }

    pub fn pad(&self) -> char {
        self.pad
    }

    pub fn base(&self) -> u32 {
        DECIMAL_BASE
    }

    /// Number of identifiers one group holds (`10^leaf_width`).
    pub fn capacity(&self) -> u64 {
        10u64.pow(self.leaf_width() as u32)
    }
}

/// Serializable form of [`Hierarchy`], as read from configuration files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Digit widths, leaf first.
    pub widths: Vec<usize>,
    #[serde(default = "default_pad")]
    pub pad_character: char,
    #[serde(default = "default_base")]
    pub base: u32,
}

fn default_pad() -> char {
    DEFAULT_PAD
}

fn default_base() -> u32 {
    DECIMAL_BASE
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            widths: vec![3, 3, 3],
            pad_character: DEFAULT_PAD,
            base: DECIMAL_BASE,
        }
    }
}

impl TryFrom<HierarchyConfig> for Hierarchy {
    type Error = TypeError;

    fn try_from(config: HierarchyConfig) -> Result<Self, Self::Error> {
        Hierarchy::new(config.widths, config.pad_character, config.base)
    }
}

impl From<&Hierarchy> for HierarchyConfig {
    fn from(hierarchy: &Hierarchy) -> Self {
        Self {
            widths: hierarchy.widths.clone(),
            pad_character: hierarchy.pad,
            base: DECIMAL_BASE,
        }
    }
}
