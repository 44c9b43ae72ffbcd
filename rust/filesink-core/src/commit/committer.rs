// rust/filesink-core/src/commit/committer.rs

//! Committer implementation.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use super::listener::{CommitListener, CommitNotifier};
use crate::config::{CommitConfig, SinkConfig};
use crate::error::{Result, SinkError};
use crate::recoverable::CommitDescriptor;
use crate::storage::FileStore;

/// Where a committable write stands, as observed in the store.
///
/// A stream that is still being appended to has no commit descriptor yet,
/// so it never shows up here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    /// The staging file awaits its transition.
    Pending,
    /// The file is visible at its target. Final.
    Committed,
}

/// How a commit call reached the committed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// This call moved the staging file to the target.
    Committed,
    /// The target was already in place from an earlier attempt.
    AlreadyCommitted,
}

/// Result of a successful commit.
#[derive(Debug)]
pub struct CommitReport {
    pub commit_name: String,
    pub outcome: CommitOutcome,
    /// Listeners notified by this call.
    pub notified: usize,
    /// Listener failures. The commit stands regardless.
    pub listener_errors: Vec<SinkError>,
}

/// A checkpoint's commits stopped at a failed file.
///
/// Files before `index` are committed and stay committed; committing them
/// again on retry is a no-op.
#[derive(Error, Debug)]
#[error("checkpoint commit failed at file {index} ('{commit_name}'): {source}")]
pub struct CheckpointCommitError {
    pub index: usize,
    pub commit_name: String,
    pub committed: Vec<CommitReport>,
    #[source]
    pub source: SinkError,
}

/// Makes staged files visible at their targets, exactly once.
///
/// A committer keeps no state about the writes it commits: every decision is
/// taken from the descriptor and from what the store shows. It can therefore
/// run in a different process than the writer, and the same descriptor may be
/// committed any number of times.
///
/// Commits for different targets may run concurrently. Callers serialize
/// commits for the same target.
pub struct Committer {
    storage: Arc<dyn FileStore>,
    config: CommitConfig,
    notifier: CommitNotifier,
}

impl Committer {
    /// Creates a committer without listeners.
    pub fn new(storage: Arc<dyn FileStore>, config: &SinkConfig) -> Self {
        Self {
            storage,
            config: config.commit.clone(),
            notifier: CommitNotifier::new(),
        }
    }

    /// Adds a listener to notify after each commit.
    #[must_use]
    pub fn with_listener(mut self, listener: impl CommitListener + 'static) -> Self {
        self.notifier.register(Arc::new(listener));
        self
    }

    /// Adds a shared listener.
    #[must_use]
    pub fn with_shared_listener(mut self, listener: Arc<dyn CommitListener>) -> Self {
        self.notifier.register(listener);
        self
    }

    /// Length of `path`, or `None` if it does not exist.
    fn observe(&self, path: &Path) -> Result<Option<u64>> {
        if !self.storage.exists(path)? {
            return Ok(None);
        }
        Ok(Some(self.storage.metadata(path)?.size))
    }

    /// Whether the target is known to hold this file, so that nothing is left
    /// to do but possibly remove the staging file.
    ///
    /// Without length verification an existing target is only trusted once
    /// the staging file is gone: while both exist, a torn copy cannot be told
    /// apart from a finished one, and the transition is run again.
    fn is_settled(
        &self,
        committable: &CommitDescriptor,
        target_len: Option<u64>,
        staging_present: bool,
    ) -> bool {
        match target_len {
            None => false,
            Some(len) if self.config.verify_target_length => len == committable.offset(),
            Some(_) => !staging_present,
        }
    }

    /// Forgets that listeners were told about `commit_name`.
    ///
    /// Call this once a name is retired (e.g. its checkpoint is subsumed) to
    /// bound the notifier's bookkeeping. A later commit of the same name
    /// notifies again.
    pub fn forget(&self, commit_name: &str) {
        self.notifier.forget(commit_name);
    }

    /// Reports the protocol state of a descriptor as seen in the store.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Commit`] when neither a complete target nor the
    /// staging file exists; such a write cannot be committed.
    pub fn state_of(&self, committable: &CommitDescriptor) -> Result<CommitState> {
        let target_len = self.observe(committable.target())?;
        let staging_present = self.observe(committable.staging())?.is_some();

        if self.is_settled(committable, target_len, staging_present) {
            return Ok(CommitState::Committed);
        }
        if staging_present {
            return Ok(CommitState::Pending);
        }
        Err(SinkError::commit(
            committable.target(),
            committable.staging(),
            "inspect",
            "neither a committed target nor the staging file exists",
        ))
    }

    /// Commits one file.
    ///
    /// 1. If the target already holds this file, the commit is treated as
    ///    done; a staging file left next to it by an interrupted copy is
    ///    removed. Only a length-verified target is trusted while its staging
    ///    file still exists.
    /// 2. Otherwise the staging file is trimmed to the recorded length and
    ///    moved to the target: by rename when the store has one, else by copy,
    ///    length check and delete. Every step can be re-run after a crash.
    /// 3. Listeners that have not yet heard of this commit name are notified.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Commit`] if the target cannot be produced. The
    /// wrapped store error says which primitive failed.
    pub fn commit(&self, committable: &CommitDescriptor) -> Result<CommitReport> {
        let target = committable.target();
        let staging = committable.staging();
        let fail = |operation: &'static str| {
            move |e: SinkError| SinkError::commit_with_source(target, staging, operation, e)
        };

        let target_len = self.observe(target).map_err(fail("inspect target"))?;
        let staging_len = self.observe(staging).map_err(fail("inspect staging"))?;

        let outcome = match (target_len, staging_len) {
            _ if self.is_settled(committable, target_len, staging_len.is_some()) => {
                if staging_len.is_some() {
                    tracing::info!(
                        staging = %staging.display(),
                        "removing staging file left by an interrupted copy"
                    );
                    self.storage.delete(staging).map_err(fail("delete staging"))?;
                }
                tracing::warn!(%committable, "target already committed, skipping transition");
                CommitOutcome::AlreadyCommitted
            }
            (Some(len), None) => {
                return Err(SinkError::commit(
                    target,
                    staging,
                    "inspect target",
                    format!(
                        "target has {len} bytes, expected {}, and the staging file is gone",
                        committable.offset()
                    ),
                ));
            }
            (None, None) => {
                return Err(SinkError::commit(
                    target,
                    staging,
                    "inspect staging",
                    "neither the staging file nor the target exists",
                ));
            }
            (_, Some(len)) => {
                if target_len.is_some() {
                    tracing::warn!(
                        target = %target.display(),
                        "replacing incomplete target from an earlier attempt"
                    );
                }
                self.prepare_staging(committable, len)?;
                self.transition(committable)?;
                tracing::info!(%committable, "committed file");
                CommitOutcome::Committed
            }
        };

        let commit_name = committable.commit_name();
        let dispatch = self.notifier.notify(&commit_name);

        Ok(CommitReport {
            commit_name,
            outcome,
            notified: dispatch.delivered,
            listener_errors: dispatch.errors,
        })
    }

    /// Brings the staging file to exactly the committed length.
    ///
    /// A staging file can be longer than the descriptor when the writer kept
    /// appending after the snapshot; those bytes belong to no checkpoint.
    fn prepare_staging(&self, committable: &CommitDescriptor, staging_len: u64) -> Result<()> {
        let target = committable.target();
        let staging = committable.staging();
        let expected = committable.offset();

        if staging_len < expected {
            return Err(SinkError::commit(
                target,
                staging,
                "inspect staging",
                format!("staging file has {staging_len} bytes, expected {expected}"),
            ));
        }
        if staging_len > expected {
            if !self.storage.capabilities().truncate {
                return Err(SinkError::commit(
                    target,
                    staging,
                    "truncate",
                    format!(
                        "staging file has {staging_len} bytes, expected {expected}, \
                         and the store cannot truncate"
                    ),
                ));
            }
            tracing::debug!(
                staging = %staging.display(),
                from = staging_len,
                to = expected,
                "trimming staging file before commit"
            );
            self.storage
                .truncate(staging, expected)
                .map_err(|e| SinkError::commit_with_source(target, staging, "truncate", e))?;
        }
        Ok(())
    }

    fn transition(&self, committable: &CommitDescriptor) -> Result<()> {
        let target = committable.target();
        let staging = committable.staging();

        if self.config.prefer_rename && self.storage.capabilities().rename {
            return self
                .storage
                .rename(staging, target)
                .map_err(|e| SinkError::commit_with_source(target, staging, "rename", e));
        }

        let copied = self
            .storage
            .copy(staging, target)
            .map_err(|e| SinkError::commit_with_source(target, staging, "copy", e))?;

        if self.config.verify_target_length {
            let written = self
                .storage
                .metadata(target)
                .map_err(|e| SinkError::commit_with_source(target, staging, "verify copy", e))?
                .size;
            if written != committable.offset() || copied != committable.offset() {
                return Err(SinkError::commit(
                    target,
                    staging,
                    "verify copy",
                    format!(
                        "target has {written} bytes after copying {copied}, expected {}",
                        committable.offset()
                    ),
                ));
            }
        }

        self.storage
            .delete(staging)
            .map_err(|e| SinkError::commit_with_source(target, staging, "delete staging", e))
    }

    /// Commits every file of one checkpoint, in order.
    ///
    /// Stops at the first failure. The checkpoint must then be treated as
    /// failed as a whole.
    pub fn commit_all<'a, I>(&self, committables: I) -> std::result::Result<Vec<CommitReport>, CheckpointCommitError>
    where
        I: IntoIterator<Item = &'a CommitDescriptor>,
    {
        let mut committed = Vec::new();

        for (index, committable) in committables.into_iter().enumerate() {
            match self.commit(committable) {
                Ok(report) => committed.push(report),
                Err(source) => {
                    let commit_name = committable.commit_name();
                    tracing::error!(
                        index,
                        commit_name = %commit_name,
                        error = %source,
                        "checkpoint commit failed"
                    );
                    return Err(CheckpointCommitError {
                        index,
                        commit_name,
                        committed,
                        source,
                    });
                }
            }
        }

        Ok(committed)
    }
}
