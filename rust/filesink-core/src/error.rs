// rust/filesink-core/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`SinkError`].
///
/// Callers use this to decide between retrying an operation, restarting a
/// logical write from scratch, or failing the whole checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient store I/O error. The caller may retry.
    IoFailure,
    /// A partial write cannot be resumed: the store cannot truncate, or the
    /// staging file is gone or shorter than recorded. The caller must
    /// restart the write from empty.
    UnsupportedRecovery,
    /// The durable transition could not be completed. The checkpoint fails.
    CommitFailure,
    /// A commit listener failed. The commit itself stands.
    ListenerFailure,
    /// Invalid configuration.
    Config,
    /// Malformed descriptor bytes or descriptor fields.
    Descriptor,
}

#[derive(Error, Debug)]
pub enum SinkError {

    #[error("I/O failure during {operation} at '{path}' (offset {offset}): {message}")]
    Io {
        path: PathBuf,
        operation: &'static str,
        offset: u64,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Recovery of '{path}' at offset {offset} is not supported: {message}")]
    UnsupportedRecovery {
        path: PathBuf,
        offset: u64,
        message: String,
    },

    #[error("Commit of '{staging}' -> '{target}' failed during {operation}: {message}")]
    Commit {
        target: PathBuf,
        staging: PathBuf,
        operation: &'static str,
        message: String,
        #[source]
        source: Option<Box<SinkError>>,
    },

    #[error("Commit listener failed for '{commit_name}': {message}")]
    Listener {
        commit_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },

    #[error("Invalid descriptor: {message}")]
    InvalidDescriptor {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, SinkError>;

// Convenience constructors
impl SinkError {

    pub fn io(
        path: impl Into<PathBuf>,
        operation: &'static str,
        offset: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::Io {
            path: path.into(),
            operation,
            offset,
            message: message.into(),
            source: None,
        }
    }

    pub fn io_with_source(
        path: impl Into<PathBuf>,
        operation: &'static str,
        offset: u64,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            path: path.into(),
            operation,
            offset,
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn unsupported_recovery(
        path: impl Into<PathBuf>,
        offset: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::UnsupportedRecovery {
            path: path.into(),
            offset,
            message: message.into(),
        }
    }

    pub fn commit(
        target: impl Into<PathBuf>,
        staging: impl Into<PathBuf>,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Commit {
            target: target.into(),
            staging: staging.into(),
            operation,
            message: message.into(),
            source: None,
        }
    }

    pub fn commit_with_source(
        target: impl Into<PathBuf>,
        staging: impl Into<PathBuf>,
        operation: &'static str,
        source: SinkError,
    ) -> Self {
        Self::Commit {
            target: target.into(),
            staging: staging.into(),
            operation,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn listener(commit_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Listener {
            commit_name: commit_name.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn listener_with_source(
        commit_name: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Listener {
            commit_name: commit_name.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn invalid_descriptor(message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            message: message.into(),
        }
    }

    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::IoFailure,
            Self::UnsupportedRecovery { .. } => ErrorKind::UnsupportedRecovery,
            Self::Commit { .. } => ErrorKind::CommitFailure,
            Self::Listener { .. } => ErrorKind::ListenerFailure,
            Self::Config { .. } => ErrorKind::Config,
            Self::Serialization { .. } | Self::InvalidDescriptor { .. } => ErrorKind::Descriptor,
        }
    }

    /// Only transient store I/O failures are worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::IoFailure
    }
}
