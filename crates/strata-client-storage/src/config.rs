//! Configuration for the storage system

use crate::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default retry cap per resource download
pub const DEFAULT_UPDATE_RETRY_COUNT: u32 = 3;

/// Default number of updated bytes between read-write list regenerations (1 MiB)
pub const DEFAULT_GENERATE_READ_WRITE_VERSION_LIST_LENGTH: u64 = 1024 * 1024;

/// Configuration for the storage system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory shipped with the build; never written
    pub read_only_path: Option<PathBuf>,

    /// Writable cache directory
    pub read_write_path: Option<PathBuf>,

    /// Base URI resources and remote manifests are downloaded from
    pub update_prefix_uri: String,

    /// Variant this client runs with, if any
    pub current_variant: Option<String>,

    /// Keep cached copies of other variants instead of removing them
    pub ignore_other_variant: bool,

    /// Retries per resource before the batch is marked failed
    pub update_retry_count: u32,

    /// Updated bytes that trigger a read-write list regeneration
    pub generate_read_write_version_list_length: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            read_only_path: None,
            read_write_path: None,
            update_prefix_uri: String::new(),
            current_variant: None,
            ignore_other_variant: false,
            update_retry_count: DEFAULT_UPDATE_RETRY_COUNT,
            generate_read_write_version_list_length:
                DEFAULT_GENERATE_READ_WRITE_VERSION_LIST_LENGTH,
        }
    }
}

impl StorageConfig {
    /// Configuration with both storage paths set
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(read_only_path: P, read_write_path: Q) -> Self {
        Self {
            read_only_path: Some(read_only_path.as_ref().to_path_buf()),
            read_write_path: Some(read_write_path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Read configuration from `STRATA_*` environment variables
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            read_only_path: std::env::var_os("STRATA_READ_ONLY_PATH").map(PathBuf::from),
            read_write_path: std::env::var_os("STRATA_READ_WRITE_PATH").map(PathBuf::from),
            update_prefix_uri: std::env::var("STRATA_UPDATE_PREFIX_URI").unwrap_or_default(),
            current_variant: std::env::var("STRATA_CURRENT_VARIANT")
                .ok()
                .filter(|v| !v.is_empty()),
            ignore_other_variant: std::env::var("STRATA_IGNORE_OTHER_VARIANT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.ignore_other_variant),
            update_retry_count: std::env::var("STRATA_UPDATE_RETRY_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.update_retry_count),
            generate_read_write_version_list_length: std::env::var(
                "STRATA_GENERATE_READ_WRITE_VERSION_LIST_LENGTH",
            )
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.generate_read_write_version_list_length),
        }
    }

    /// Set the read-only path
    #[must_use]
    pub fn with_read_only_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.read_only_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the read-write path
    #[must_use]
    pub fn with_read_write_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.read_write_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the update prefix URI
    #[must_use]
    pub fn with_update_prefix_uri(mut self, uri: impl Into<String>) -> Self {
        self.update_prefix_uri = uri.into();
        self
    }

    /// Set the current variant
    #[must_use]
    pub fn with_current_variant(mut self, variant: Option<impl Into<String>>) -> Self {
        self.current_variant = variant.map(Into::into).filter(|v: &String| !v.is_empty());
        self
    }

    /// Keep or remove cached copies of other variants
    #[must_use]
    pub const fn with_ignore_other_variant(mut self, ignore: bool) -> Self {
        self.ignore_other_variant = ignore;
        self
    }

    /// Set the per-resource retry cap
    #[must_use]
    pub const fn with_update_retry_count(mut self, count: u32) -> Self {
        self.update_retry_count = count;
        self
    }

    /// Set the regeneration threshold in bytes
    #[must_use]
    pub const fn with_generate_read_write_version_list_length(mut self, length: u64) -> Self {
        self.generate_read_write_version_list_length = length;
        self
    }

    /// Check both paths are present
    pub fn validate(&self) -> Result<()> {
        self.read_only_dir()?;
        self.read_write_dir()?;
        Ok(())
    }

    /// Read-only path, or a configuration error
    pub fn read_only_dir(&self) -> Result<&Path> {
        self.read_only_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| StorageError::Config("read-only path is not set".to_string()))
    }

    /// Read-write path, or a configuration error
    pub fn read_write_dir(&self) -> Result<&Path> {
        self.read_write_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| StorageError::Config("read-write path is not set".to_string()))
    }

    /// Update prefix URI, or a configuration error
    pub fn update_prefix(&self) -> Result<&str> {
        if self.update_prefix_uri.is_empty() {
            return Err(StorageError::Config("update prefix URI is not set".to_string()));
        }
        Ok(self.update_prefix_uri.trim_end_matches('/'))
    }
}
