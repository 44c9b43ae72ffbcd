// rust/filesink-core/src/commit/mod.rs

//! Committing staged files.
//!
//! A [`Committer`] takes a [`CommitDescriptor`](crate::recoverable::CommitDescriptor)
//! produced by a writer and makes the staging file visible at its target.
//! Commits are idempotent: re-running a commit after a crash, or after the
//! checkpoint was replayed, finishes the job or recognizes it as done.
//!
//! ```
//! use std::sync::Arc;
//! use filesink_core::commit::{CommitOutcome, Committer, LoggingListener};
//! use filesink_core::config::SinkConfig;
//! use filesink_core::recoverable::CommitDescriptor;
//! use filesink_core::storage::MemoryStore;
//!
//! let store = MemoryStore::new();
//! store.put("/out/.part-0.inprogress", b"rows".to_vec());
//!
//! let committer = Committer::new(Arc::new(store.clone()), &SinkConfig::default())
//!     .with_listener(LoggingListener);
//! let committable = CommitDescriptor::new("/out/part-0", "/out/.part-0.inprogress", 4)?;
//!
//! assert_eq!(committer.commit(&committable)?.outcome, CommitOutcome::Committed);
//! assert_eq!(committer.commit(&committable)?.outcome, CommitOutcome::AlreadyCommitted);
//! # Ok::<(), filesink_core::error::SinkError>(())
//! ```

mod committer;
mod listener;

pub use committer::{CheckpointCommitError, CommitOutcome, CommitReport, CommitState, Committer};
pub use listener::{
    ChannelListener, CommitListener, CommitNotifier, Dispatch, ListenerError, LoggingListener,
};
