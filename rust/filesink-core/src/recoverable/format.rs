// rust/filesink-core/src/recoverable/format.rs

//! Checkpoint encoding of recoverable descriptors.
//!
//! ```text
//! +---------------------------+
//! | Magic "FSRD" (4 bytes)    |
//! +---------------------------+
//! | Version (2 bytes)         |  <- u16 little-endian
//! +---------------------------+
//! | Kind (1 byte)             |  <- 0 = commit, 1 = resume
//! +---------------------------+
//! | Body Length (4 bytes)     |  <- u32 little-endian
//! +---------------------------+
//! | Body (bincode)            |  <- DescriptorRecord
//! +---------------------------+
//! | Checksum (8 bytes)        |  <- XXHash64 of the body, little-endian
//! +---------------------------+
//! ```
//!
//! Later point releases may only append fields to `DescriptorRecord`.
//! Decoding reads the fields it knows and ignores the rest of the body.

use std::hash::Hasher;

use bincode::Options;
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use super::descriptor::{CommitDescriptor, ResumeDescriptor};
use crate::error::{Result, SinkError};

/// Magic bytes for encoded descriptors.
pub const MAGIC: [u8; 4] = *b"FSRD";

/// Version written by this release.
pub const FORMAT_VERSION: u16 = 1;

const HEADER_SIZE: usize = 4 + 2 + 1 + 4;
const CHECKSUM_SIZE: usize = 8;

/// Which facet an encoded descriptor carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DescriptorKind {
    Commit = 0,
    Resume = 1,
}

impl DescriptorKind {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Commit),
            1 => Ok(Self::Resume),
            other => Err(SinkError::serialization(format!(
                "unknown descriptor kind {other}"
            ))),
        }
    }
}

/// Wire form of a descriptor body.
#[derive(Debug, Serialize, Deserialize)]
struct DescriptorRecord {
    target: String,
    staging: String,
    offset: u64,
}

/// A decoded descriptor of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    Commit(CommitDescriptor),
    Resume(ResumeDescriptor),
}

impl Descriptor {
    pub fn kind(&self) -> DescriptorKind {
        match self {
            Self::Commit(_) => DescriptorKind::Commit,
            Self::Resume(_) => DescriptorKind::Resume,
        }
    }

    /// Converts to the commit facet. A resume descriptor commits the bytes
    /// it recorded as durable.
    pub fn into_commit(self) -> CommitDescriptor {
        match self {
            Self::Commit(c) => c,
            Self::Resume(r) => r.into(),
        }
    }
}

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .allow_trailing_bytes()
}

fn checksum(body: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(body);
    hasher.finish()
}

/// Frames an already serialized body.
fn frame(kind: DescriptorKind, version: u16, body: &[u8]) -> Result<Vec<u8>> {
    let body_len = u32::try_from(body.len())
        .map_err(|_| SinkError::serialization("descriptor body exceeds 4 GiB"))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + body.len() + CHECKSUM_SIZE);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&version.to_le_bytes());
    out.push(kind as u8);
    out.extend_from_slice(&body_len.to_le_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(&checksum(body).to_le_bytes());
    Ok(out)
}

fn encode(kind: DescriptorKind, target: &str, staging: &str, offset: u64) -> Result<Vec<u8>> {
    let record = DescriptorRecord {
        target: target.to_string(),
        staging: staging.to_string(),
        offset,
    };
    let body = bincode_options()
        .serialize(&record)
        .map_err(|e| SinkError::serialization(format!("failed to serialize descriptor: {e}")))?;
    frame(kind, FORMAT_VERSION, &body)
}

/// Decodes a descriptor of either kind.
///
/// # Errors
///
/// Returns [`SinkError::Serialization`] for bad magic, unknown version or
/// kind, truncation, or a checksum mismatch, and
/// [`SinkError::InvalidDescriptor`] if the decoded fields break descriptor
/// invariants.
pub fn decode(bytes: &[u8]) -> Result<Descriptor> {
    if bytes.len() < HEADER_SIZE + CHECKSUM_SIZE {
        return Err(SinkError::serialization(format!(
            "descriptor too short: {} bytes",
            bytes.len()
        )));
    }
    if bytes[0..4] != MAGIC {
        return Err(SinkError::serialization("invalid descriptor magic"));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version == 0 {
        return Err(SinkError::serialization("unsupported descriptor version 0"));
    }
    let kind = DescriptorKind::from_byte(bytes[6])?;
    let body_len = u32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]) as usize;

    let body_end = HEADER_SIZE + body_len;
    if bytes.len() < body_end + CHECKSUM_SIZE {
        return Err(SinkError::serialization(format!(
            "descriptor truncated: body of {body_len} bytes declared, {} bytes available",
            bytes.len().saturating_sub(HEADER_SIZE + CHECKSUM_SIZE)
        )));
    }
    let body = &bytes[HEADER_SIZE..body_end];

    let mut stored = [0u8; CHECKSUM_SIZE];
    stored.copy_from_slice(&bytes[body_end..body_end + CHECKSUM_SIZE]);
    if u64::from_le_bytes(stored) != checksum(body) {
        return Err(SinkError::serialization("descriptor checksum mismatch"));
    }

    let record: DescriptorRecord = bincode_options()
        .deserialize(body)
        .map_err(|e| SinkError::serialization(format!("failed to deserialize descriptor: {e}")))?;

    Ok(match kind {
        DescriptorKind::Commit => Descriptor::Commit(CommitDescriptor::new(
            record.target,
            record.staging,
            record.offset,
        )?),
        DescriptorKind::Resume => Descriptor::Resume(ResumeDescriptor::new(
            record.target,
            record.staging,
            record.offset,
        )?),
    })
}

// Descriptors are validated as UTF-8 on construction, so to_string_lossy
// never substitutes characters here.
impl ResumeDescriptor {
    /// Encodes this descriptor for checkpoint state.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(
            DescriptorKind::Resume,
            &self.target().to_string_lossy(),
            &self.staging().to_string_lossy(),
            self.offset(),
        )
    }

    /// Decodes a resume descriptor.
    ///
    /// # Errors
    ///
    /// Fails if the bytes hold a commit descriptor; a commit descriptor
    /// cannot be resumed.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        match decode(bytes)? {
            Descriptor::Resume(r) => Ok(r),
            Descriptor::Commit(c) => Err(SinkError::serialization(format!(
                "expected a resume descriptor, found {c}"
            ))),
        }
    }
}

impl CommitDescriptor {
    /// Encodes this descriptor for checkpoint state.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(
            DescriptorKind::Commit,
            &self.target().to_string_lossy(),
            &self.staging().to_string_lossy(),
            self.offset(),
        )
    }

    /// Decodes a commit descriptor. Encoded resume descriptors are accepted
    /// and converted.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes).map(Descriptor::into_commit)
    }
}
