// rust/filesink-core/src/storage/memory.rs

//! In-memory store with configurable capabilities and fault injection.
//!
//! Bytes written through a [`StoreWriter`] stay in the writer's buffer until
//! `flush`/`sync`, and dropping a writer does *not* flush it. Dropping a
//! writer therefore behaves like a process crash: everything after the last
//! sync is lost. This makes the store suitable for exercising recovery paths
//! without killing processes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use super::traits::{FileStore, ObjectMeta, StoreCapabilities, StoreWriter};
use crate::error::{Result, SinkError};

/// Store primitives that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Exists,
    Metadata,
    Read,
    Create,
    OpenAppend,
    Write,
    Sync,
    Truncate,
    Rename,
    Copy,
    Delete,
    List,
}

impl StoreOp {
    fn name(self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::Metadata => "metadata",
            Self::Read => "read",
            Self::Create => "create",
            Self::OpenAppend => "open for append",
            Self::Write => "append",
            Self::Sync => "sync",
            Self::Truncate => "truncate",
            Self::Rename => "rename",
            Self::Copy => "copy",
            Self::Delete => "delete",
            Self::List => "list",
        }
    }
}

#[derive(Debug)]
struct MemFile {
    data: Vec<u8>,
    modified: SystemTime,
}

impl MemFile {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            modified: SystemTime::now(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    files: BTreeMap<PathBuf, MemFile>,
    dirs: BTreeSet<PathBuf>,
    faults: HashMap<StoreOp, usize>,
    calls: HashMap<StoreOp, usize>,
    /// Total bytes the store will hold before reporting out of space.
    capacity: Option<u64>,
}

impl Inner {
    /// Records a call and fails it if a fault is armed for `op`.
    fn enter(&mut self, op: StoreOp, path: &Path) -> Result<()> {
        *self.calls.entry(op).or_insert(0) += 1;

        if let Some(remaining) = self.faults.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SinkError::io(path, op.name(), 0, "injected fault"));
            }
        }
        Ok(())
    }

    fn stored_bytes(&self) -> u64 {
        self.files.values().map(|f| f.data.len() as u64).sum()
    }

    fn free_bytes(&self) -> Option<u64> {
        self.capacity
            .map(|cap| cap.saturating_sub(self.stored_bytes()))
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path) || self.files.keys().any(|p| p != path && p.starts_with(path))
    }

    fn file(&self, path: &Path, op: StoreOp) -> Result<&MemFile> {
        self.files
            .get(path)
            .ok_or_else(|| SinkError::io(path, op.name(), 0, "no such file"))
    }
}

/// An in-process [`FileStore`].
///
/// Cloning a `MemoryStore` yields another handle on the same contents, so a
/// test can keep a handle for inspection while the writer and committer own
/// theirs.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    capabilities: StoreCapabilities,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with every primitive available.
    pub fn new() -> Self {
        Self::with_capabilities(StoreCapabilities::FULL)
    }

    /// Creates an empty store offering only the given primitives.
    pub fn with_capabilities(capabilities: StoreCapabilities) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            capabilities,
        }
    }

    /// Returns a handle on the same contents with different capabilities.
    ///
    /// Useful for "recovering" on a store client that lacks a primitive the
    /// original writer had.
    pub fn view_with_capabilities(&self, capabilities: StoreCapabilities) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            capabilities,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `times` calls of `op` fail with an I/O error.
    pub fn fail_next(&self, op: StoreOp, times: usize) {
        self.lock().faults.insert(op, times);
    }

    /// Limits the total number of bytes the store holds. `None` is unlimited.
    pub fn set_capacity(&self, capacity: Option<u64>) {
        self.lock().capacity = capacity;
    }

    /// Number of times `op` has been called, including failed calls.
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Writes a whole file directly, bypassing writers.
    pub fn put(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.lock().files.insert(path.into(), MemFile::new(data.into()));
    }

    /// Returns the durable contents of a file.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.lock().files.get(path.as_ref()).map(|f| f.data.clone())
    }

    /// Overrides a file's modification time.
    pub fn set_modified(&self, path: impl AsRef<Path>, modified: SystemTime) {
        if let Some(file) = self.lock().files.get_mut(path.as_ref()) {
            file.modified = modified;
        }
    }

    /// All file paths currently stored, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().files.keys().cloned().collect()
    }

    fn unsupported(path: &Path, op: StoreOp) -> SinkError {
        SinkError::io(path, op.name(), 0, "operation not supported by this store")
    }
}

impl FileStore for MemoryStore {
    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        let mut inner = self.lock();
        inner.enter(StoreOp::Exists, path)?;
        Ok(inner.files.contains_key(path) || inner.is_dir(path))
    }

    fn metadata(&self, path: &Path) -> Result<ObjectMeta> {
        let mut inner = self.lock();
        inner.enter(StoreOp::Metadata, path)?;

        if let Some(file) = inner.files.get(path) {
            return Ok(ObjectMeta {
                size: file.data.len() as u64,
                modified: Some(file.modified),
                is_dir: false,
            });
        }
        if inner.is_dir(path) {
            return Ok(ObjectMeta {
                size: 0,
                modified: None,
                is_dir: true,
            });
        }
        Err(SinkError::io(path, StoreOp::Metadata.name(), 0, "no such file"))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let mut inner = self.lock();
        inner.enter(StoreOp::Read, path)?;
        Ok(inner.file(path, StoreOp::Read)?.data.clone())
    }

    fn create(&self, path: &Path) -> Result<Box<dyn StoreWriter>> {
        let mut inner = self.lock();
        inner.enter(StoreOp::Create, path)?;

        if inner.files.contains_key(path) {
            return Err(SinkError::io(path, StoreOp::Create.name(), 0, "file already exists"));
        }
        inner.files.insert(path.to_path_buf(), MemFile::new(Vec::new()));

        Ok(Box::new(MemWriter {
            inner: Arc::clone(&self.inner),
            path: path.to_path_buf(),
            durable_len: 0,
            buffer: Vec::new(),
        }))
    }

    fn open_append(&self, path: &Path) -> Result<Box<dyn StoreWriter>> {
        let mut inner = self.lock();
        inner.enter(StoreOp::OpenAppend, path)?;
        let len = inner.file(path, StoreOp::OpenAppend)?.data.len() as u64;

        Ok(Box::new(MemWriter {
            inner: Arc::clone(&self.inner),
            path: path.to_path_buf(),
            durable_len: len,
            buffer: Vec::new(),
        }))
    }

    fn truncate(&self, path: &Path, len: u64) -> Result<()> {
        if !self.capabilities.truncate {
            return Err(Self::unsupported(path, StoreOp::Truncate));
        }

        let mut inner = self.lock();
        inner.enter(StoreOp::Truncate, path)?;

        let file = inner
            .files
            .get_mut(path)
            .ok_or_else(|| SinkError::io(path, StoreOp::Truncate.name(), len, "no such file"))?;
        let current = file.data.len() as u64;
        if current < len {
            return Err(SinkError::io(
                path,
                StoreOp::Truncate.name(),
                len,
                format!("file is only {current} bytes long"),
            ));
        }
        file.data.truncate(len as usize);
        file.modified = SystemTime::now();
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if !self.capabilities.rename {
            return Err(Self::unsupported(from, StoreOp::Rename));
        }

        let mut inner = self.lock();
        inner.enter(StoreOp::Rename, from)?;

        let file = inner
            .files
            .remove(from)
            .ok_or_else(|| SinkError::io(from, StoreOp::Rename.name(), 0, "no such file"))?;
        inner.files.insert(to.to_path_buf(), file);
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<u64> {
        let mut inner = self.lock();
        inner.enter(StoreOp::Copy, from)?;

        let data = inner.file(from, StoreOp::Copy)?.data.clone();
        let replaced = inner.files.get(to).map_or(0, |f| f.data.len() as u64);
        if let Some(free) = inner.free_bytes() {
            if free + replaced < data.len() as u64 {
                return Err(SinkError::io(to, StoreOp::Copy.name(), 0, "no space left on store"));
            }
        }

        let copied = data.len() as u64;
        inner.files.insert(to.to_path_buf(), MemFile::new(data));
        Ok(copied)
    }

    fn delete(&self, path: &Path) -> Result<()> {
        let mut inner = self.lock();
        inner.enter(StoreOp::Delete, path)?;

        if inner.files.remove(path).is_some() {
            return Ok(());
        }
        if inner.is_dir(path) {
            inner.files.retain(|p, _| !p.starts_with(path));
            inner.dirs.retain(|p| !p.starts_with(path));
            return Ok(());
        }
        Err(SinkError::io(path, StoreOp::Delete.name(), 0, "no such file"))
    }

    fn list(&self, dir: &Path) -> Result<Vec<String>> {
        let mut inner = self.lock();
        inner.enter(StoreOp::List, dir)?;

        if inner.files.contains_key(dir) {
            return Err(SinkError::io(dir, StoreOp::List.name(), 0, "path is not a directory"));
        }

        let names: BTreeSet<String> = inner
            .files
            .keys()
            .chain(inner.dirs.iter())
            .filter_map(|p| p.strip_prefix(dir).ok())
            .filter_map(|rest| rest.components().next())
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        Ok(names.into_iter().collect())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut inner = self.lock();
        for ancestor in path.ancestors() {
            if !ancestor.as_os_str().is_empty() {
                inner.dirs.insert(ancestor.to_path_buf());
            }
        }
        Ok(())
    }
}

/// Append handle on a [`MemoryStore`] file.
///
/// Not flushed on drop.
struct MemWriter {
    inner: Arc<Mutex<Inner>>,
    path: PathBuf,
    /// Length of the file in the store as of the last flush.
    durable_len: u64,
    buffer: Vec<u8>,
}

impl MemWriter {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn to_io_error(err: SinkError) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
    }
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let accepted = {
            let mut inner = self.lock();
            inner
                .enter(StoreOp::Write, &self.path)
                .map_err(Self::to_io_error)?;

            match inner.free_bytes() {
                Some(free) => {
                    let free = free.saturating_sub(self.buffer.len() as u64);
                    if free == 0 && !buf.is_empty() {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            "no space left on store",
                        ));
                    }
                    buf.len().min(free as usize)
                }
                None => buf.len(),
            }
        };

        self.buffer.extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut inner = self.lock();
        let file = inner.files.get_mut(&self.path).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "staging file vanished")
        })?;
        file.data.extend_from_slice(&self.buffer);
        file.modified = SystemTime::now();
        drop(inner);

        self.durable_len += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }
}

impl StoreWriter for MemWriter {
    fn position(&self) -> u64 {
        self.durable_len + self.buffer.len() as u64
    }

    fn sync(&mut self) -> Result<()> {
        self.lock().enter(StoreOp::Sync, &self.path)?;
        let position = self.position();
        self.flush()
            .map_err(|e| SinkError::io_with_source(&self.path, "sync", position, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsynced_bytes_lost_on_drop() {
        let store = MemoryStore::new();

        let mut writer = store.create(Path::new("/tmp/staging")).unwrap();
        writer.write_all(b"durable").unwrap();
        writer.sync().unwrap();
        writer.write_all(b" lost").unwrap();
        assert_eq!(writer.position(), 12);
        drop(writer);

        assert_eq!(store.contents("/tmp/staging").unwrap(), b"durable");
    }

    #[test]
    fn test_injected_fault_fires_once() {
        let store = MemoryStore::new();
        store.put("/out/a", b"x".to_vec());
        store.fail_next(StoreOp::Exists, 1);

        assert!(store.exists(Path::new("/out/a")).is_err());
        assert!(store.exists(Path::new("/out/a")).unwrap());
        assert_eq!(store.call_count(StoreOp::Exists), 2);
    }

    #[test]
    fn test_capacity_reports_partial_write() {
        let store = MemoryStore::new();
        store.set_capacity(Some(4));

        let mut writer = store.create(Path::new("/tmp/staging")).unwrap();
        let result = writer.write_all(b"0123456789");

        assert!(result.is_err());
        assert_eq!(writer.position(), 4);
    }

    #[test]
    fn test_capabilities_gate_primitives() {
        let store = MemoryStore::with_capabilities(StoreCapabilities {
            truncate: false,
            rename: false,
        });
        store.put("/a", b"0123".to_vec());

        assert!(store.truncate(Path::new("/a"), 2).is_err());
        assert!(store.rename(Path::new("/a"), Path::new("/b")).is_err());
        assert_eq!(store.copy(Path::new("/a"), Path::new("/b")).unwrap(), 4);
        assert_eq!(store.contents("/a").unwrap(), b"0123");
    }

    #[test]
    fn test_view_shares_contents() {
        let store = MemoryStore::new();
        let view = store.view_with_capabilities(StoreCapabilities {
            truncate: false,
            rename: true,
        });

        store.put("/a", b"shared".to_vec());
        assert_eq!(view.read(Path::new("/a")).unwrap(), b"shared");
        assert!(!view.capabilities().truncate);
    }

    #[test]
    fn test_list_and_directories() {
        let store = MemoryStore::new();
        store.put("/out/b", Vec::new());
        store.put("/out/a", Vec::new());
        store.put("/out/sub/c", Vec::new());
        store.put("/other/d", Vec::new());

        assert_eq!(store.list(Path::new("/out")).unwrap(), vec!["a", "b", "sub"]);
        assert!(store.metadata(Path::new("/out/sub")).unwrap().is_dir);
        assert!(store.list(Path::new("/missing")).unwrap().is_empty());

        store.delete(Path::new("/out/sub")).unwrap();
        assert_eq!(store.list(Path::new("/out")).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_rename_replaces_target() {
        let store = MemoryStore::new();
        store.put("/a", b"new".to_vec());
        store.put("/b", b"old".to_vec());

        store.rename(Path::new("/a"), Path::new("/b")).unwrap();

        assert_eq!(store.contents("/b").unwrap(), b"new");
        assert!(store.contents("/a").is_none());
    }
}
