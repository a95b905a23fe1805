use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::store::BufferConfig;

/// Configuration for one logical package database
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Host switch: rebuild the package list after cache refreshes
    pub update_package_list: bool,
    /// Bound of the enumeration channel (producers block when full)
    pub stream_capacity: usize,
    /// Abort a cycle that stages more than this many records
    pub max_records: Option<usize>,
    /// Where published snapshots are written; `None` keeps everything in memory
    pub snapshot_path: Option<PathBuf>,
    /// Write each published snapshot to `snapshot_path`
    pub persist_on_publish: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            update_package_list: true,
            stream_capacity: 1024,
            max_records: None,
            snapshot_path: None,
            persist_on_publish: true,
        }
    }
}

impl DatabaseConfig {
    /// Load configuration from a JSON file; missing keys take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn with_update_package_list(mut self, enabled: bool) -> Self {
        self.update_package_list = enabled;
        self
    }

    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity.max(1);
        self
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn with_persist_on_publish(mut self, persist: bool) -> Self {
        self.persist_on_publish = persist;
        self
    }

    /// Snapshot path if publishing should persist
    pub fn persist_path(&self) -> Option<&Path> {
        if self.persist_on_publish {
            self.snapshot_path.as_deref()
        } else {
            None
        }
    }

    /// Staging limits derived from this configuration
    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig {
            max_records: self.max_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = DatabaseConfig::default();
        assert!(config.update_package_list);
        assert_eq!(config.stream_capacity, 1024);
        assert!(config.max_records.is_none());
        assert!(config.persist_path().is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = DatabaseConfig::default()
            .with_update_package_list(false)
            .with_stream_capacity(0)
            .with_max_records(500)
            .with_snapshot_path("/var/cache/pkgdb/packages.snapshot");

        assert!(!config.update_package_list);
        assert_eq!(config.stream_capacity, 1);
        assert_eq!(config.buffer_config().max_records, Some(500));
        assert_eq!(
            config.persist_path(),
            Some(Path::new("/var/cache/pkgdb/packages.snapshot"))
        );

        let config = config.with_persist_on_publish(false);
        assert!(config.persist_path().is_none());
    }

    #[test]
    fn test_from_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkgdb.json");
        std::fs::write(&path, r#"{"update_package_list": false, "max_records": 10}"#).unwrap();

        let config = DatabaseConfig::from_json_file(&path).unwrap();
        assert!(!config.update_package_list);
        assert_eq!(config.max_records, Some(10));
        assert_eq!(config.stream_capacity, 1024);
    }
}
