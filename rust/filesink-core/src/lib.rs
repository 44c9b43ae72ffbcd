// rust/filesink-core/src/lib.rs

//! Recoverable File Sink - Core Library
//!
//! Exactly-once file output for checkpointed stream processing. Writers
//! append to hidden staging files and hand out small descriptors that can be
//! stored in checkpoint state; after a failure, a descriptor resumes the
//! write at its last durable byte or commits the file to its final name.
//! Commits are idempotent and notify listeners once per file.

pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::SinkConfig;
pub use error::{ErrorKind, Result, SinkError};
pub use storage::{FileStore, LocalStorage, MemoryStore, ObjectMeta, StoreCapabilities, StoreWriter};

pub mod recoverable;
pub use recoverable::{CommitDescriptor, RecoverableStream, RecoverableWriter, ResumeDescriptor};

pub mod commit;
pub use commit::{
    CheckpointCommitError, CommitListener, CommitOutcome, CommitReport, CommitState, Committer,
};

pub mod cleanup;
pub use cleanup::{CleanupReport, StagingJanitor};

#[cfg(test)]
mod protocol_tests;
