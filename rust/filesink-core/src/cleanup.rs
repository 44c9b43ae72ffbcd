// rust/filesink-core/src/cleanup.rs

//! Removal of abandoned staging files.
//!
//! A staging file is abandoned when no checkpoint references it any more,
//! typically because a write was restarted from empty after
//! [`UnsupportedRecovery`](crate::error::ErrorKind::UnsupportedRecovery) or
//! because the checkpoint that held its descriptor was discarded. Nothing in
//! the commit protocol deletes such files; the janitor does, once they are
//! older than the configured retention.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::config::{SinkConfig, WriterConfig};
use crate::error::{Result, SinkError};
use crate::storage::FileStore;

/// What a cleanup pass found and did.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Staging files found in the directory.
    pub scanned: usize,
    /// Files deleted, or that would have been deleted in a dry run.
    pub removed: Vec<PathBuf>,
    /// Staging files kept because they are live or too young.
    pub retained: usize,
    /// Per-file failures. They do not stop the pass.
    pub errors: Vec<SinkError>,
    pub dry_run: bool,
}

/// Deletes unreferenced staging files past their retention.
pub struct StagingJanitor {
    storage: Arc<dyn FileStore>,
    naming: WriterConfig,
    retention: Duration,
    dry_run: bool,
}

impl StagingJanitor {
    pub fn new(storage: Arc<dyn FileStore>, config: &SinkConfig) -> Self {
        Self {
            storage,
            naming: config.writer.clone(),
            retention: Duration::from_secs(config.cleanup.retention_secs),
            dry_run: config.cleanup.dry_run,
        }
    }

    /// Whether `file_name` follows the staging naming scheme
    /// `<prefix><name><suffix>.<uuid>`.
    pub fn is_staging_name(&self, file_name: &str) -> bool {
        let Some((stem, id)) = file_name.rsplit_once('.') else {
            return false;
        };
        if Uuid::parse_str(id).is_err() {
            return false;
        }
        stem.strip_prefix(self.naming.staging_prefix.as_str())
            .and_then(|rest| rest.strip_suffix(self.naming.staging_suffix.as_str()))
            .is_some_and(|name| !name.is_empty())
    }

    /// Scans `dir` and removes staging files that are not in `live` and were
    /// last modified more than the retention before `now`.
    ///
    /// `live` holds the staging paths of every descriptor still referenced
    /// by a checkpoint, as the descriptors carry them. Paths are compared
    /// after [`FileStore::resolve`], so a live path spelled differently from
    /// `dir` (absolute against relative, say) is still recognized.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory cannot be listed.
    pub fn clean(
        &self,
        dir: &Path,
        live: &HashSet<PathBuf>,
        now: SystemTime,
    ) -> Result<CleanupReport> {
        let mut report = CleanupReport {
            dry_run: self.dry_run,
            ..Default::default()
        };

        let entries = self.storage.list(dir)?;
        let live: HashSet<PathBuf> = live.iter().map(|p| self.storage.resolve(p)).collect();

        for name in entries.iter().filter(|n| self.is_staging_name(n)) {
            let path = dir.join(name);
            report.scanned += 1;

            if live.contains(&self.storage.resolve(&path)) {
                report.retained += 1;
                continue;
            }

            let meta = match self.storage.metadata(&path) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot inspect staging file");
                    report.errors.push(e);
                    continue;
                }
            };
            if meta.is_dir {
                report.scanned -= 1;
                continue;
            }

            // Files of unknown age are kept
            let expired = meta
                .modified
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age >= self.retention);
            if !expired {
                report.retained += 1;
                continue;
            }

            if self.dry_run {
                tracing::info!(path = %path.display(), "would remove abandoned staging file");
                report.removed.push(path);
                continue;
            }

            match self.storage.delete(&path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), size = meta.size, "removed abandoned staging file");
                    report.removed.push(path);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove staging file");
                    report.errors.push(e);
                }
            }
        }

        tracing::debug!(
            dir = %dir.display(),
            scanned = report.scanned,
            removed = report.removed.len(),
            retained = report.retained,
            "staging cleanup finished"
        );

        Ok(report)
    }
}
