// rust/filesink-core/src/storage/mod.rs

//! Store backends for the recoverable file sink.
//!
//! The writer and committer only talk to [`FileStore`]. Two backends ship
//! with the crate:
//!
//! - [`LocalStorage`]: the local filesystem, with every primitive.
//! - [`MemoryStore`]: an in-process store whose capabilities and failures
//!   can be configured, for tests and embedding.
//!
//! # Example
//!
//! ```no_run
//! use filesink_core::config::StorageConfig;
//! use filesink_core::storage::{FileStore, LocalStorage};
//! use std::io::Write;
//! use std::path::Path;
//!
//! let storage = LocalStorage::new(&StorageConfig::default()).unwrap();
//!
//! let mut writer = storage.create(Path::new("out/.part-0.inprogress")).unwrap();
//! writer.write_all(b"Hello, world!").unwrap();
//! writer.sync().unwrap();
//!
//! storage
//!     .rename(Path::new("out/.part-0.inprogress"), Path::new("out/part-0"))
//!     .unwrap();
//! ```

mod local;
mod memory;
mod traits;

pub use local::LocalStorage;
pub use memory::{MemoryStore, StoreOp};
pub use traits::{FileStore, ObjectMeta, StoreCapabilities, StoreWriter};
