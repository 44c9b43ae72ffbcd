// rust/filesink-core/src/storage/traits.rs

//! Store primitive traits consumed by the recoverable writer and committer.
//!
//! The commit protocol never touches a filesystem directly. It sequences
//! calls to these primitives, so any store that can provide them (local
//! disk, a distributed filesystem client, an in-memory fake) can back a
//! file sink.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Size of the object in bytes.
    pub size: u64,
    /// Last modification time, if available.
    pub modified: Option<std::time::SystemTime>,
    /// Whether this object is a directory.
    pub is_dir: bool,
}

/// Optional primitives a store may or may not offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// The store can shrink a file to a given length.
    ///
    /// Without this, a partially written file cannot be resumed.
    pub truncate: bool,
    /// The store has an atomic rename. Without it, commits fall back to
    /// copy, verify, then delete.
    pub rename: bool,
}

impl StoreCapabilities {
    /// Every primitive available.
    pub const FULL: Self = Self {
        truncate: true,
        rename: true,
    };
}

impl Default for StoreCapabilities {
    fn default() -> Self {
        Self::FULL
    }
}

/// An append handle on a staging file.
///
/// Bytes accepted by `write` may sit in a buffer until `flush` or `sync` is
/// called; only synced bytes survive a crash.
pub trait StoreWriter: Write + Send {
    /// Logical length of the file including bytes still buffered.
    fn position(&self) -> u64;

    /// Flushes buffered bytes and makes everything written so far durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or the sync fails.
    fn sync(&mut self) -> Result<()>;
}

/// The store primitive boundary.
///
/// # Object Safety
///
/// This trait is object-safe and is normally used as `Arc<dyn FileStore>`.
pub trait FileStore: Send + Sync {
    /// Reports which optional primitives this store supports.
    fn capabilities(&self) -> StoreCapabilities;

    /// Checks if an object exists at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the existence check itself fails (e.g. the store
    /// is unreachable). A missing object is `Ok(false)`.
    fn exists(&self, path: &Path) -> Result<bool>;

    /// Retrieves metadata for an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist or metadata cannot be read.
    fn metadata(&self, path: &Path) -> Result<ObjectMeta>;

    /// Reads a whole object into memory.
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Creates a new, empty file and opens it for appending.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a file already exists at `path`.
    fn create(&self, path: &Path) -> Result<Box<dyn StoreWriter>>;

    /// Opens an existing file for appending at its current end.
    fn open_append(&self, path: &Path) -> Result<Box<dyn StoreWriter>>;

    /// Shrinks a file to `len` bytes and makes the new length durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lacks truncate support or the file is
    /// shorter than `len`.
    fn truncate(&self, path: &Path, len: u64) -> Result<()>;

    /// Atomically renames `from` to `to`, replacing `to` if present.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Copies `from` to `to`, replacing `to` if present. Returns the number of
    /// bytes copied.
    fn copy(&self, from: &Path, to: &Path) -> Result<u64>;

    /// Deletes an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist or cannot be deleted.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Lists entry names directly under a directory, sorted.
    ///
    /// A missing directory lists as empty.
    fn list(&self, dir: &Path) -> Result<Vec<String>>;

    /// Creates a directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Maps `path` to the single form this store addresses it by.
    ///
    /// Two paths naming the same object resolve to equal values, whether
    /// they were given relative to the store's base or absolute. Used to
    /// compare paths that came from different sources.
    fn resolve(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}
