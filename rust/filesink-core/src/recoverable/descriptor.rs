// rust/filesink-core/src/recoverable/descriptor.rs

//! Resume and commit descriptors for in-flight file writes.
//!
//! Both descriptors are immutable values over the same three fields: the
//! final target path, the staging path holding the bytes, and a byte offset.
//! For a [`ResumeDescriptor`] the offset is the truncation point to resume
//! from; for a [`CommitDescriptor`] it is the length the committed file must
//! have.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, SinkError};

/// Returns the commit name for a target path.
///
/// The commit name depends on the target path only, so retried commits of
/// the same logical file (possibly through different staging files) always
/// report the same name.
pub fn commit_name(target: &Path) -> String {
    target.to_string_lossy().into_owned()
}

/// Shared, validated core of both descriptor kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WriteState {
    target: PathBuf,
    staging: PathBuf,
    offset: u64,
}

impl WriteState {
    fn new(target: PathBuf, staging: PathBuf, offset: u64) -> Result<Self> {
        if target.as_os_str().is_empty() {
            return Err(SinkError::invalid_descriptor("target path must not be empty"));
        }
        if staging.as_os_str().is_empty() {
            return Err(SinkError::invalid_descriptor("staging path must not be empty"));
        }
        if target == staging {
            return Err(SinkError::invalid_descriptor(format!(
                "target and staging path must differ (both '{}')",
                target.display()
            )));
        }
        // The checkpoint encoding stores paths as UTF-8
        if target.to_str().is_none() || staging.to_str().is_none() {
            return Err(SinkError::invalid_descriptor("paths must be valid UTF-8"));
        }

        Ok(Self {
            target,
            staging,
            offset,
        })
    }
}

impl fmt::Display for WriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} -> {}",
            self.staging.display(),
            self.offset,
            self.target.display()
        )
    }
}

/// Everything needed to resume appending to a staging file after a failure.
///
/// Bytes of the staging file past [`offset`](Self::offset) were never
/// confirmed durable and are discarded on resume.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResumeDescriptor(WriteState);

impl ResumeDescriptor {
    /// Creates a resume descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::InvalidDescriptor`] if either path is empty, the
    /// paths are equal, or a path is not valid UTF-8.
    pub fn new(target: impl Into<PathBuf>, staging: impl Into<PathBuf>, offset: u64) -> Result<Self> {
        WriteState::new(target.into(), staging.into(), offset).map(Self)
    }

    pub fn target(&self) -> &Path {
        &self.0.target
    }

    pub fn staging(&self) -> &Path {
        &self.0.staging
    }

    /// Number of staging bytes confirmed durable; the resume position.
    pub fn offset(&self) -> u64 {
        self.0.offset
    }

    pub fn commit_name(&self) -> String {
        commit_name(&self.0.target)
    }

    /// The commit descriptor that would finalize the file as of this snapshot.
    pub fn to_commit(&self) -> CommitDescriptor {
        CommitDescriptor(self.0.clone())
    }
}

impl fmt::Display for ResumeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resume {}", self.0)
    }
}

/// Everything needed to make a finished staging file visible at its target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitDescriptor(WriteState);

impl CommitDescriptor {
    /// Creates a commit descriptor for a staging file of `len` durable bytes.
    ///
    /// # Errors
    ///
    /// Same validation as [`ResumeDescriptor::new`].
    pub fn new(target: impl Into<PathBuf>, staging: impl Into<PathBuf>, len: u64) -> Result<Self> {
        WriteState::new(target.into(), staging.into(), len).map(Self)
    }

    pub fn target(&self) -> &Path {
        &self.0.target
    }

    pub fn staging(&self) -> &Path {
        &self.0.staging
    }

    /// Length the committed file must have.
    pub fn offset(&self) -> u64 {
        self.0.offset
    }

    pub fn commit_name(&self) -> String {
        commit_name(&self.0.target)
    }
}

impl From<ResumeDescriptor> for CommitDescriptor {
    fn from(resume: ResumeDescriptor) -> Self {
        Self(resume.0)
    }
}

impl fmt::Display for CommitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "commit {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_name_ignores_staging_and_offset() {
        let a = ResumeDescriptor::new("/out/part-0", "/out/.part-0.inprogress.a", 0).unwrap();
        let b = ResumeDescriptor::new("/out/part-0", "/tmp/.part-0.inprogress.b", 4096).unwrap();
        let c = CommitDescriptor::new("/out/part-0", "/tmp/other", 17).unwrap();

        assert_eq!(a.commit_name(), "/out/part-0");
        assert_eq!(a.commit_name(), b.commit_name());
        assert_eq!(b.commit_name(), c.commit_name());
    }

    #[test]
    fn test_commit_name_differs_per_target() {
        let a = CommitDescriptor::new("/out/part-0", "/tmp/s", 0).unwrap();
        let b = CommitDescriptor::new("/out/part-1", "/tmp/s", 0).unwrap();
        assert_ne!(a.commit_name(), b.commit_name());
    }

    #[test]
    fn test_equality_is_by_value() {
        let a = ResumeDescriptor::new("/out/part-0", "/tmp/s", 10).unwrap();
        let b = ResumeDescriptor::new(PathBuf::from("/out/part-0"), Path::new("/tmp/s"), 10).unwrap();
        let c = ResumeDescriptor::new("/out/part-0", "/tmp/s", 11).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_rejects_empty_paths() {
        assert!(ResumeDescriptor::new("", "/tmp/s", 0).is_err());
        assert!(ResumeDescriptor::new("/out/part-0", "", 0).is_err());
        assert!(CommitDescriptor::new("", "", 0).is_err());
    }

    #[test]
    fn test_rejects_identical_paths() {
        let err = CommitDescriptor::new("/out/part-0", "/out/part-0", 0).unwrap_err();
        assert!(matches!(err, SinkError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_resume_to_commit_keeps_fields() {
        let resume = ResumeDescriptor::new("/out/part-0", "/tmp/s", 100).unwrap();
        let commit = resume.to_commit();

        assert_eq!(commit.target(), resume.target());
        assert_eq!(commit.staging(), resume.staging());
        assert_eq!(commit.offset(), 100);
        assert_eq!(commit, CommitDescriptor::from(resume));
    }

    #[test]
    fn test_display() {
        let resume = ResumeDescriptor::new("/out/part-0", "/tmp/.part-0.inprogress", 100).unwrap();
        assert_eq!(
            resume.to_string(),
            "resume /tmp/.part-0.inprogress @ 100 -> /out/part-0"
        );
    }
}
