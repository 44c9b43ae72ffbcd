// rust/filesink-core/src/config.rs

//! Configuration management for the recoverable file sink.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, SinkError};

// Top-level sink configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub storage: StorageConfig,
    pub writer: WriterConfig,
    pub commit: CommitConfig,
    pub cleanup: CleanupConfig,
}

// Storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Base path that relative paths are resolved against.
    pub base_path: PathBuf,
    // Buffer size in bytes for staging file appends.
    pub buffer_size: usize,
    // Whether snapshots fsync the staging file (not just flush it).
    pub sync_on_persist: bool,
}

/// Naming of staging files produced by the recoverable writer.
///
/// A staging file for target `dir/name` is `dir/<prefix><name><suffix>.<uuid>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub staging_prefix: String,
    pub staging_suffix: String,
}

// Committer options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    // Compare the target length against the descriptor before trusting it.
    pub verify_target_length: bool,
    // Use rename when the store has it. When false, always copy then delete.
    pub prefer_rename: bool,
}

// Abandoned staging file cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    // Minimum age (seconds) before an unreferenced staging file is deleted.
    pub retention_secs: u64,
    // Report what would be deleted without deleting.
    pub dry_run: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            buffer_size: 64 * 1024, // 64 KB
            sync_on_persist: true,
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            staging_prefix: ".".to_string(),
            staging_suffix: ".inprogress".to_string(),
        }
    }
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            verify_target_length: true,
            prefer_rename: true,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            retention_secs: 24 * 60 * 60,
            dry_run: false,
        }
    }
}

impl FromStr for SinkConfig {
    type Err = SinkError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| SinkError::config_with_source("failed to parse TOML config", e))
    }
}

impl SinkConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SinkError::config_with_source(
                format!("failed to read config file {}", path.display()),
                e,
            )
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `FSINK_` and use underscores
    // to separate nested fields. For example:
    // - `FSINK_STORAGE_BASE_PATH` overrides `storage.base_path`
    // - `FSINK_WRITER_STAGING_SUFFIX` overrides `writer.staging_suffix`
    // - `FSINK_COMMIT_PREFER_RENAME` overrides `commit.prefer_rename`
    // - `FSINK_CLEANUP_RETENTION_SECS` overrides `cleanup.retention_secs`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Storage overrides
        if let Ok(val) = std::env::var("FSINK_STORAGE_BASE_PATH") {
            self.storage.base_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("FSINK_STORAGE_BUFFER_SIZE") {
            if let Ok(v) = val.parse() {
                self.storage.buffer_size = v;
            }
        }
        if let Ok(val) = std::env::var("FSINK_STORAGE_SYNC_ON_PERSIST") {
            if let Ok(v) = val.parse() {
                self.storage.sync_on_persist = v;
            }
        }

        // Writer overrides
        if let Ok(val) = std::env::var("FSINK_WRITER_STAGING_PREFIX") {
            self.writer.staging_prefix = val;
        }
        if let Ok(val) = std::env::var("FSINK_WRITER_STAGING_SUFFIX") {
            self.writer.staging_suffix = val;
        }

        // Commit overrides
        if let Ok(val) = std::env::var("FSINK_COMMIT_VERIFY_TARGET_LENGTH") {
            if let Ok(v) = val.parse() {
                self.commit.verify_target_length = v;
            }
        }
        if let Ok(val) = std::env::var("FSINK_COMMIT_PREFER_RENAME") {
            if let Ok(v) = val.parse() {
                self.commit.prefer_rename = v;
            }
        }

        // Cleanup overrides
        if let Ok(val) = std::env::var("FSINK_CLEANUP_RETENTION_SECS") {
            if let Ok(v) = val.parse() {
                self.cleanup.retention_secs = v;
            }
        }
        if let Ok(val) = std::env::var("FSINK_CLEANUP_DRY_RUN") {
            if let Ok(v) = val.parse() {
                self.cleanup.dry_run = v;
            }
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.buffer_size == 0 {
            return Err(SinkError::config(
                "storage.buffer_size must be greater than 0",
            ));
        }

        // An empty suffix would make staging files indistinguishable from
        // committed ones during cleanup.
        if self.writer.staging_suffix.is_empty() {
            return Err(SinkError::config(
                "writer.staging_suffix must not be empty",
            ));
        }
        if self.writer.staging_prefix.contains('/') || self.writer.staging_suffix.contains('/') {
            return Err(SinkError::config(
                "writer staging prefix and suffix must not contain '/'",
            ));
        }

        if self.cleanup.retention_secs == 0 {
            return Err(SinkError::config(
                "cleanup.retention_secs must be greater than 0",
            ));
        }

        Ok(())
    }
}
