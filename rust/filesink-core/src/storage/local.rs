// rust/filesink-core/src/storage/local.rs

//! Local filesystem store.
//!
//! POSIX `rename` is atomic within a filesystem and `set_len` gives a
//! durable truncate, so this store offers every primitive.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::traits::{FileStore, ObjectMeta, StoreCapabilities, StoreWriter};
use crate::config::StorageConfig;
use crate::error::{Result, SinkError};

/// Local filesystem store.
pub struct LocalStorage {
    /// Base path that relative paths are resolved against.
    base_path: PathBuf,
    /// Buffer size for staging file appends.
    buffer_size: usize,
}

impl LocalStorage {
    /// Creates a new `LocalStorage` instance from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base path cannot be created.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let base_path = config.base_path.clone();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                SinkError::io_with_source(&base_path, "create base directory", 0, e)
            })?;
        }

        Ok(Self {
            base_path,
            buffer_size: config.buffer_size,
        })
    }

    /// Resolves a path relative to the base path.
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    fn ensure_parent(&self, path: &Path) -> Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                self.create_dir_all(parent)
            }
            _ => Ok(()),
        }
    }
}

impl FileStore for LocalStorage {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::FULL
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        let full_path = self.resolve_path(path);
        full_path
            .try_exists()
            .map_err(|e| SinkError::io_with_source(&full_path, "exists", 0, e))
    }

    fn metadata(&self, path: &Path) -> Result<ObjectMeta> {
        let full_path = self.resolve_path(path);
        let meta = fs::metadata(&full_path)
            .map_err(|e| SinkError::io_with_source(&full_path, "metadata", 0, e))?;

        Ok(ObjectMeta {
            size: meta.len(),
            modified: meta.modified().ok(),
            is_dir: meta.is_dir(),
        })
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let full_path = self.resolve_path(path);
        fs::read(&full_path).map_err(|e| SinkError::io_with_source(&full_path, "read", 0, e))
    }

    fn create(&self, path: &Path) -> Result<Box<dyn StoreWriter>> {
        let full_path = self.resolve_path(path);
        self.ensure_parent(&full_path)?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .map_err(|e| SinkError::io_with_source(&full_path, "create", 0, e))?;

        Ok(Box::new(LocalWriter::new(file, full_path, 0, self.buffer_size)))
    }

    fn open_append(&self, path: &Path) -> Result<Box<dyn StoreWriter>> {
        let full_path = self.resolve_path(path);
        let file = OpenOptions::new()
            .append(true)
            .open(&full_path)
            .map_err(|e| SinkError::io_with_source(&full_path, "open for append", 0, e))?;
        let len = file
            .metadata()
            .map_err(|e| SinkError::io_with_source(&full_path, "metadata", 0, e))?
            .len();

        Ok(Box::new(LocalWriter::new(file, full_path, len, self.buffer_size)))
    }

    fn truncate(&self, path: &Path, len: u64) -> Result<()> {
        let full_path = self.resolve_path(path);
        let file = OpenOptions::new()
            .write(true)
            .open(&full_path)
            .map_err(|e| SinkError::io_with_source(&full_path, "truncate", len, e))?;

        let current = file
            .metadata()
            .map_err(|e| SinkError::io_with_source(&full_path, "truncate", len, e))?
            .len();
        if current < len {
            return Err(SinkError::io(
                &full_path,
                "truncate",
                len,
                format!("file is only {current} bytes long"),
            ));
        }

        file.set_len(len)
            .map_err(|e| SinkError::io_with_source(&full_path, "truncate", len, e))?;
        file.sync_all()
            .map_err(|e| SinkError::io_with_source(&full_path, "sync after truncate", len, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from_path = self.resolve_path(from);
        let to_path = self.resolve_path(to);
        self.ensure_parent(&to_path)?;

        fs::rename(&from_path, &to_path).map_err(|e| SinkError::Io {
            path: from_path.clone(),
            operation: "rename",
            offset: 0,
            message: format!("failed to rename to {}: {e}", to_path.display()),
            source: Some(e),
        })
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<u64> {
        let from_path = self.resolve_path(from);
        let to_path = self.resolve_path(to);
        self.ensure_parent(&to_path)?;

        let copied = fs::copy(&from_path, &to_path).map_err(|e| SinkError::Io {
            path: from_path.clone(),
            operation: "copy",
            offset: 0,
            message: format!("failed to copy to {}: {e}", to_path.display()),
            source: Some(e),
        })?;

        // fs::copy does not sync the destination
        File::open(&to_path)
            .and_then(|f| f.sync_all())
            .map_err(|e| SinkError::io_with_source(&to_path, "sync after copy", copied, e))?;

        Ok(copied)
    }

    fn delete(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve_path(path);

        if full_path.is_dir() {
            fs::remove_dir_all(&full_path)
                .map_err(|e| SinkError::io_with_source(&full_path, "delete directory", 0, e))
        } else {
            fs::remove_file(&full_path)
                .map_err(|e| SinkError::io_with_source(&full_path, "delete", 0, e))
        }
    }

    fn list(&self, dir: &Path) -> Result<Vec<String>> {
        let full_path = self.resolve_path(dir);

        if !full_path.exists() {
            return Ok(Vec::new());
        }

        if !full_path.is_dir() {
            return Err(SinkError::io(&full_path, "list", 0, "path is not a directory"));
        }

        let mut entries = Vec::new();

        for entry in fs::read_dir(&full_path)
            .map_err(|e| SinkError::io_with_source(&full_path, "list", 0, e))?
        {
            let entry = entry.map_err(|e| SinkError::io_with_source(&full_path, "list", 0, e))?;

            if let Some(name) = entry.file_name().to_str() {
                entries.push(name.to_string());
            }
        }

        entries.sort();
        Ok(entries)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve_path(path);
        fs::create_dir_all(&full_path)
            .map_err(|e| SinkError::io_with_source(&full_path, "create directories", 0, e))
    }

    /// Joins relative paths onto the base path and canonicalizes the parent
    /// directory, so symlinked or `..`-laden spellings compare equal. The
    /// file itself need not exist.
    fn resolve(&self, path: &Path) -> PathBuf {
        let full_path = self.resolve_path(path);
        match (full_path.parent(), full_path.file_name()) {
            (Some(parent), Some(name)) => fs::canonicalize(parent)
                .map(|p| p.join(name))
                .unwrap_or(full_path),
            _ => full_path,
        }
    }
}

/// Buffered append handle for local staging files.
struct LocalWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    position: u64,
}

impl LocalWriter {
    fn new(file: File, path: PathBuf, position: u64, buffer_size: usize) -> Self {
        Self {
            writer: BufWriter::with_capacity(buffer_size, file),
            path,
            position,
        }
    }
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StoreWriter for LocalWriter {
    fn position(&self) -> u64 {
        self.position
    }

    fn sync(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| SinkError::io_with_source(&self.path, "flush", self.position, e))?;

        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| SinkError::io_with_source(&self.path, "sync", self.position, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (LocalStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            base_path: temp_dir.path().to_path_buf(),
            buffer_size: 4096,
            ..Default::default()
        };
        let storage = LocalStorage::new(&config).unwrap();
        (storage, temp_dir)
    }

    fn write_file(storage: &LocalStorage, path: &str, data: &[u8]) {
        let mut writer = storage.create(Path::new(path)).unwrap();
        writer.write_all(data).unwrap();
        writer.sync().unwrap();
    }

    #[test]
    fn test_new_creates_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let new_base = temp_dir.path().join("new_subdir");

        let config = StorageConfig {
            base_path: new_base.clone(),
            ..Default::default()
        };

        let _storage = LocalStorage::new(&config).unwrap();
        assert!(new_base.exists());
    }

    #[test]
    fn test_capabilities() {
        let (storage, _temp) = create_test_storage();
        assert_eq!(storage.capabilities(), StoreCapabilities::FULL);
    }

    #[test]
    fn test_create_and_read() {
        let (storage, _temp) = create_test_storage();

        assert!(!storage.exists(Path::new("out/part-0")).unwrap());
        write_file(&storage, "out/part-0", b"hello world");

        assert!(storage.exists(Path::new("out/part-0")).unwrap());
        assert_eq!(storage.read(Path::new("out/part-0")).unwrap(), b"hello world");
        assert_eq!(storage.metadata(Path::new("out/part-0")).unwrap().size, 11);
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let (storage, _temp) = create_test_storage();

        write_file(&storage, "staging", b"first");
        assert!(storage.create(Path::new("staging")).is_err());
        assert_eq!(storage.read(Path::new("staging")).unwrap(), b"first");
    }

    #[test]
    fn test_writer_position_tracks_buffered_bytes() {
        let (storage, _temp) = create_test_storage();

        let mut writer = storage.create(Path::new("staging")).unwrap();
        writer.write_all(b"abc").unwrap();
        assert_eq!(writer.position(), 3);

        writer.sync().unwrap();
        assert_eq!(storage.metadata(Path::new("staging")).unwrap().size, 3);
    }

    #[test]
    fn test_open_append_continues_at_end() {
        let (storage, _temp) = create_test_storage();
        write_file(&storage, "staging", b"0123");

        let mut writer = storage.open_append(Path::new("staging")).unwrap();
        assert_eq!(writer.position(), 4);
        writer.write_all(b"45").unwrap();
        writer.sync().unwrap();

        assert_eq!(storage.read(Path::new("staging")).unwrap(), b"012345");
    }

    #[test]
    fn test_truncate() {
        let (storage, _temp) = create_test_storage();
        write_file(&storage, "staging", b"0123456789");

        storage.truncate(Path::new("staging"), 4).unwrap();
        assert_eq!(storage.read(Path::new("staging")).unwrap(), b"0123");
    }

    #[test]
    fn test_truncate_beyond_length_fails() {
        let (storage, _temp) = create_test_storage();
        write_file(&storage, "staging", b"0123");

        assert!(storage.truncate(Path::new("staging"), 10).is_err());
        assert_eq!(storage.read(Path::new("staging")).unwrap(), b"0123");
    }

    #[test]
    fn test_rename_creates_parent_dirs() {
        let (storage, _temp) = create_test_storage();
        write_file(&storage, "file.txt", b"hello");

        storage
            .rename(Path::new("file.txt"), Path::new("a/b/c/file.txt"))
            .unwrap();

        assert!(!storage.exists(Path::new("file.txt")).unwrap());
        assert!(storage.exists(Path::new("a/b/c/file.txt")).unwrap());
    }

    #[test]
    fn test_rename_not_found() {
        let (storage, _temp) = create_test_storage();

        let result = storage.rename(Path::new("nonexistent.txt"), Path::new("new.txt"));
        assert!(result.is_err());
    }

    #[test]
    fn test_copy_replaces_destination() {
        let (storage, _temp) = create_test_storage();
        write_file(&storage, "src", b"full contents");
        write_file(&storage, "dst", b"part");

        let copied = storage.copy(Path::new("src"), Path::new("dst")).unwrap();

        assert_eq!(copied, 13);
        assert_eq!(storage.read(Path::new("dst")).unwrap(), b"full contents");
        assert!(storage.exists(Path::new("src")).unwrap());
    }

    #[test]
    fn test_delete_file() {
        let (storage, _temp) = create_test_storage();
        write_file(&storage, "test.txt", b"hello");

        storage.delete(Path::new("test.txt")).unwrap();

        assert!(!storage.exists(Path::new("test.txt")).unwrap());
    }

    #[test]
    fn test_delete_not_found() {
        let (storage, _temp) = create_test_storage();

        let result = storage.delete(Path::new("nonexistent.txt"));
        assert!(result.is_err());
    }

    #[test]
    fn test_list_with_files() {
        let (storage, _temp) = create_test_storage();

        for name in &["c.txt", "a.txt", "b.txt"] {
            write_file(&storage, &format!("dir/{name}"), b"data");
        }

        let entries = storage.list(Path::new("dir")).unwrap();
        assert_eq!(entries, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn test_list_nonexistent() {
        let (storage, _temp) = create_test_storage();

        let entries = storage.list(Path::new("nonexistent")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_list_file_not_dir() {
        let (storage, _temp) = create_test_storage();
        write_file(&storage, "file.txt", b"data");

        assert!(storage.list(Path::new("file.txt")).is_err());
    }

    #[test]
    fn test_create_dir_all_existing() {
        let (storage, _temp) = create_test_storage();

        storage.create_dir_all(Path::new("existing")).unwrap();
        storage.create_dir_all(Path::new("existing")).unwrap();
        assert!(storage.metadata(Path::new("existing")).unwrap().is_dir);
    }

    #[test]
    fn test_resolve_relative_and_absolute_agree() {
        let (storage, temp) = create_test_storage();
        storage.create_dir_all(Path::new("out")).unwrap();

        let relative = storage.resolve(Path::new("out/.part-0.inprogress.x"));
        let absolute = storage.resolve(&temp.path().join("out/.part-0.inprogress.x"));
        let dotted = storage.resolve(&temp.path().join("out/../out/.part-0.inprogress.x"));

        assert_eq!(relative, absolute);
        assert_eq!(relative, dotted);
        assert!(relative.is_absolute());
    }

    #[test]
    fn test_object_safety() {
        let (storage, _temp) = create_test_storage();

        let backend: Box<dyn FileStore> = Box::new(storage);

        let mut writer = backend.create(Path::new("test.txt")).unwrap();
        writer.write_all(b"hello").unwrap();
        writer.sync().unwrap();

        assert!(backend.exists(Path::new("test.txt")).unwrap());
    }
}
