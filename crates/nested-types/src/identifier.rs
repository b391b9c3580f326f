use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::TypeError;

/// File extension of a loose object file.
pub const OBJECT_EXTENSION: &str = "bin";

/// Numeric key naming one stored object.
///
/// An `Identifier` is kept as a canonical decimal string (ASCII digits, no
/// leading zeros except for `"0"` itself). Comparison is numeric, so
/// identifiers of any magnitude order correctly without a fixed-width integer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Parse a decimal string. Leading zeros are stripped.
    pub fn new(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypeError::InvalidIdentifier(s.to_string()));
        }
        Ok(Self::from_digits(s))
    }

    /// The zero identifier.
    pub fn zero() -> Self {
        Self("0".to_string())
    }

    /// Build from a string already known to contain only ASCII digits.
    pub(crate) fn from_digits(digits: &str) -> Self {
        let trimmed = digits.trim_start_matches('0');
        if trimmed.is_empty() {
            Self::zero()
        } else {
            Self(trimmed.to_string())
        }
    }

    /// The canonical decimal representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of decimal digits.
    pub fn digit_count(&self) -> usize {
        self.0.len()
    }

    /// The value as a `u64`, or `None` if it does not fit.
    pub fn to_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    /// The next identifier (`self + 1`).
    pub fn successor(&self) -> Self {
        let mut digits = self.0.clone().into_bytes();
        let mut carry = true;
        for digit in digits.iter_mut().rev() {
            if *digit == b'9' {
                *digit = b'0';
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, b'1');
        }
        Self(digits.into_iter().map(char::from).collect())
    }

    /// Loose object file name, e.g. `12345.bin`.
    pub fn file_name(&self) -> String {
        format!("{}.{OBJECT_EXTENSION}", self.0)
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<u64> for Identifier {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}
