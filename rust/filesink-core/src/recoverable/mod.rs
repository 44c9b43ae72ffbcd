// rust/filesink-core/src/recoverable/mod.rs

//! Recoverable writes: staging files that survive a failure.
//!
//! A write goes through three states:
//!
//! ```text
//!   open ──snapshot_for_commit──▶ pending ──Committer::commit──▶ committed
//!    │  ▲
//!    │  └──resume_from(ResumeDescriptor)
//!    └─────snapshot_for_resume──▶ ResumeDescriptor (into checkpoint state)
//! ```
//!
//! Descriptors are the only thing that crosses a failure. They are encoded
//! into checkpoint state with [`ResumeDescriptor::encode`] /
//! [`CommitDescriptor::encode`] and handed back after recovery.
//!
//! # Example
//!
//! ```no_run
//! use filesink_core::config::SinkConfig;
//! use filesink_core::recoverable::RecoverableWriter;
//! use filesink_core::storage::LocalStorage;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let config = SinkConfig::default();
//! let storage = Arc::new(LocalStorage::new(&config.storage).unwrap());
//! let writer = RecoverableWriter::new(storage, &config);
//!
//! let mut stream = writer.open_new(Path::new("out/part-0")).unwrap();
//! stream.append(b"first batch").unwrap();
//!
//! // Checkpoint: persist the resume point
//! let state = stream.snapshot_for_resume().unwrap().encode().unwrap();
//!
//! stream.append(b"second batch").unwrap();
//! let committable = stream.snapshot_for_commit().unwrap();
//! # let _ = (state, committable);
//! ```

mod descriptor;
mod format;
mod writer;

pub use descriptor::{commit_name, CommitDescriptor, ResumeDescriptor};
pub use format::{decode, Descriptor, DescriptorKind, FORMAT_VERSION, MAGIC};
pub use writer::{RecoverableStream, RecoverableWriter};
