use std::path::{Path, PathBuf};
use std::time::Duration;

use nested_types::{Hierarchy, HierarchyConfig};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Filestore configuration, usually read from a TOML file:
///
/// ```toml
/// root = "/srv/objects"
///
/// [hierarchy]
/// widths = [3, 3, 3]
/// pad_character = "0"
///
/// [retry]
/// attempts = 5
/// backoff_ms = 200
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the group hierarchy.
    pub root: PathBuf,
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl StoreConfig {
    /// Configuration for `root` with the default hierarchy and retry policy.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            hierarchy: HierarchyConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_hierarchy(mut self, hierarchy: HierarchyConfig) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Validate the hierarchy section.
    pub fn hierarchy(&self) -> StoreResult<Hierarchy> {
        Ok(Hierarchy::try_from(self.hierarchy.clone())?)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Bounded retry applied when opening a loose object file that is registered
/// but not yet visible on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total open attempts, including the first.
    pub attempts: u32,
    /// Delay between attempts.
    #[serde(rename = "backoff_ms", with = "millis")]
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    /// A single attempt with no delay.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_millis(200),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.root, PathBuf::from("."));
        assert_eq!(c.hierarchy.widths, vec![3, 3, 3]);
        assert_eq!(c.retry.attempts, 5);
        assert_eq!(c.retry.backoff, Duration::from_millis(200));
    }

    #[test]
    fn parse_full_toml() {
        let c = StoreConfig::from_toml_str(
            r#"
            root = "/srv/objects"

            [hierarchy]
            widths = [2, 4]
            pad_character = "_"

            [retry]
            attempts = 3
            backoff_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(c.root, PathBuf::from("/srv/objects"));
        assert_eq!(c.hierarchy.widths, vec![2, 4]);
        assert_eq!(c.hierarchy.pad_character, '_');
        assert_eq!(c.retry, RetryPolicy::new(3, Duration::from_millis(50)));

        let h = c.hierarchy().unwrap();
        assert_eq!(h.leaf_width(), 2);
    }

    #[test]
    fn sections_default_when_absent() {
        let c = StoreConfig::from_toml_str(r#"root = "data""#).unwrap();
        assert_eq!(c.hierarchy, HierarchyConfig::default());
        assert_eq!(c.retry, RetryPolicy::default());
    }

    #[test]
    fn rejects_bad_toml_and_bad_hierarchy() {
        let err = StoreConfig::from_toml_str("root = ").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));

        let c = StoreConfig::from_toml_str(
            r#"
            root = "data"
            [hierarchy]
            widths = [3, 3]
            base = 16
            "#,
        )
        .unwrap();
        assert!(matches!(c.hierarchy(), Err(StoreError::Type(_))));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoreConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
