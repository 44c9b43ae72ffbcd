// rust/filesink-core/src/recoverable/writer.rs

//! Recoverable writer implementation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use super::descriptor::{CommitDescriptor, ResumeDescriptor};
use crate::config::{SinkConfig, WriterConfig};
use crate::error::{Result, SinkError};
use crate::storage::{FileStore, StoreWriter};

/// Opens and resumes staging files for output targets.
///
/// The `RecoverableWriter` handles:
/// - Allocating a fresh staging file per write attempt
/// - Resuming a staging file from a [`ResumeDescriptor`], discarding bytes
///   that were never confirmed durable
///
/// It holds no per-file state; each open or resumed file is a separate
/// [`RecoverableStream`].
pub struct RecoverableWriter {
    storage: Arc<dyn FileStore>,
    config: WriterConfig,
    sync_on_persist: bool,
}

impl RecoverableWriter {
    /// Creates a new recoverable writer.
    pub fn new(storage: Arc<dyn FileStore>, config: &SinkConfig) -> Self {
        Self {
            storage,
            config: config.writer.clone(),
            sync_on_persist: config.storage.sync_on_persist,
        }
    }

    /// Whether streams written through this store can be resumed.
    pub fn supports_resume(&self) -> bool {
        self.storage.capabilities().truncate
    }

    /// Opens a new staging file for `target`.
    ///
    /// Every call allocates a staging path that no earlier attempt used, so a
    /// staging file left behind by a failed attempt is never reused.
    ///
    /// # Errors
    ///
    /// Returns an error if `target` has no file name or the staging file
    /// cannot be created.
    pub fn open_new(&self, target: &Path) -> Result<RecoverableStream> {
        let staging = self.staging_path_for(target)?;
        let out = self.storage.create(&staging)?;

        tracing::debug!(
            target = %target.display(),
            staging = %staging.display(),
            "opened staging file"
        );

        Ok(RecoverableStream {
            out,
            target: target.to_path_buf(),
            staging,
            sync_on_persist: self.sync_on_persist,
            failed: false,
        })
    }

    /// Reopens the staging file of `resumable` positioned at its offset.
    ///
    /// Bytes past the offset are truncated away before the stream is handed
    /// back, so the first append lands exactly at the recorded offset.
    ///
    /// # Errors
    ///
    /// - [`SinkError::UnsupportedRecovery`] if the store cannot truncate, or
    ///   the staging file is missing or shorter than the offset. Retrying
    ///   cannot help; the caller must restart the logical write with
    ///   [`open_new`](Self::open_new). The store is not touched in that case.
    /// - [`SinkError::Io`] if the staging file cannot be inspected, truncated
    ///   or reopened.
    pub fn resume_from(&self, resumable: &ResumeDescriptor) -> Result<RecoverableStream> {
        let staging = resumable.staging();
        let offset = resumable.offset();

        if !self.supports_resume() {
            return Err(SinkError::unsupported_recovery(
                staging,
                offset,
                "store cannot truncate files; restart the write from scratch",
            ));
        }

        if !self.storage.exists(staging)? {
            return Err(SinkError::unsupported_recovery(
                staging,
                offset,
                format!("staging file for '{}' not found", resumable.commit_name()),
            ));
        }

        let len = self.storage.metadata(staging)?.size;
        if len < offset {
            return Err(SinkError::unsupported_recovery(
                staging,
                offset,
                format!("staging file has {len} bytes, fewer than the recorded offset"),
            ));
        }
        if len > offset {
            tracing::info!(
                staging = %staging.display(),
                discarded = len - offset,
                offset,
                "truncating unconfirmed bytes before resume"
            );
            self.storage.truncate(staging, offset)?;
        }

        let out = self.storage.open_append(staging)?;
        if out.position() != offset {
            return Err(SinkError::io(
                staging,
                "resume",
                offset,
                format!("reopened staging file at {} instead of the offset", out.position()),
            ));
        }

        tracing::info!(%resumable, "resumed recoverable stream");

        Ok(RecoverableStream {
            out,
            target: resumable.target().to_path_buf(),
            staging: staging.to_path_buf(),
            sync_on_persist: self.sync_on_persist,
            failed: false,
        })
    }

    /// Generates a fresh staging path next to `target`.
    fn staging_path_for(&self, target: &Path) -> Result<PathBuf> {
        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SinkError::invalid_descriptor(format!(
                    "target '{}' has no UTF-8 file name",
                    target.display()
                ))
            })?;

        let staging_name = format!(
            "{}{}{}.{}",
            self.config.staging_prefix,
            name,
            self.config.staging_suffix,
            Uuid::new_v4()
        );
        Ok(target.with_file_name(staging_name))
    }
}

/// An open staging file for one output target.
///
/// A stream has exactly one producer: `append` and the snapshot methods
/// take `&mut self`, so they cannot overlap.
///
/// After any failed append or flush the stream refuses further work, since
/// its position no longer reflects confirmed bytes. Recover by resuming from
/// the last [`ResumeDescriptor`].
pub struct RecoverableStream {
    out: Box<dyn StoreWriter>,
    target: PathBuf,
    staging: PathBuf,
    sync_on_persist: bool,
    failed: bool,
}

impl RecoverableStream {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// Bytes appended so far, durable or not.
    pub fn position(&self) -> u64 {
        self.out.position()
    }

    fn check_usable(&self, operation: &'static str) -> Result<()> {
        if self.failed {
            return Err(SinkError::io(
                &self.staging,
                operation,
                self.position(),
                "stream failed earlier; resume from the last snapshot",
            ));
        }
        Ok(())
    }

    /// Appends bytes to the staging file.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the store rejects the bytes. The error
    /// states how many of them were accepted before the failure.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_usable("append")?;

        let start = self.out.position();
        if let Err(e) = self.out.write_all(bytes) {
            self.failed = true;
            let accepted = self.out.position() - start;
            return Err(SinkError::Io {
                path: self.staging.clone(),
                operation: "append",
                offset: start,
                message: format!(
                    "{accepted} of {} bytes accepted before failure: {e}",
                    bytes.len()
                ),
                source: Some(e),
            });
        }
        Ok(())
    }

    fn flush_durable(&mut self) -> Result<()> {
        let result = if self.sync_on_persist {
            self.out.sync()
        } else {
            let position = self.out.position();
            self.out
                .flush()
                .map_err(|e| SinkError::io_with_source(&self.staging, "flush", position, e))
        };
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    /// Flushes buffered bytes and records the durable offset.
    ///
    /// The stream stays open for further appends.
    pub fn snapshot_for_resume(&mut self) -> Result<ResumeDescriptor> {
        self.check_usable("snapshot")?;
        self.flush_durable()?;

        let resumable = ResumeDescriptor::new(&self.target, &self.staging, self.position())?;
        tracing::debug!(%resumable, "persisted recoverable stream");
        Ok(resumable)
    }

    /// Flushes buffered bytes and closes the stream for commit.
    pub fn snapshot_for_commit(mut self) -> Result<CommitDescriptor> {
        self.check_usable("close for commit")?;
        self.flush_durable()?;

        let committable = CommitDescriptor::new(&self.target, &self.staging, self.position())?;
        tracing::debug!(%committable, "closed recoverable stream for commit");
        Ok(committable)
    }
}
