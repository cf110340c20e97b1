//! Storage abstraction layer for Stratum.
//!
//! An index lives in a flat namespace of named files inside one [`Storage`].
//! Segment files, the `segments` list, the `deletable` list and the advisory
//! lock files all go through this trait, so the same index code runs against
//! a directory on disk or a transient in-memory store.
//!
//! # Storage Types
//!
//! ## FileStorage
//! - Disk-based persistent storage rooted at one directory
//! - Locks are `<name>.lock` files created exclusively
//!
//! ## MemoryStorage
//! - In-memory storage, used by the index writer to buffer fresh segments
//! - Fast but non-persistent
//!
//! # Example
//!
//! ```
//! use stratum::storage::{StorageFactory, StorageConfig};
//! use stratum::storage::memory::MemoryStorageConfig;
//!
//! # fn main() -> stratum::error::Result<()> {
//! let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))?;
//! assert!(!storage.file_exists("segments"));
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Seek, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StratumError};

pub mod file;
pub mod memory;
pub mod structured;

/// File metadata information.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// File size in bytes.
    pub size: u64,

    /// Last modified time (seconds since epoch).
    pub modified: u64,
}

/// A trait for storage backends that can store and retrieve named files.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create a file for writing, truncating any existing file of that name.
    ///
    /// The data becomes visible to readers once the output is closed.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file.
    ///
    /// Deleting a file that does not exist succeeds. A file that cannot be
    /// removed (for example because another process holds it open on some
    /// platforms) reports an error and remains in place.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all files in the storage, sorted by name.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Get the size of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Get size and modification time of a file.
    fn metadata(&self, name: &str) -> Result<FileMetadata>;

    /// Rename a file, replacing `new_name` if it already exists.
    ///
    /// Used to publish files atomically: write `x.new`, then rename to `x`.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Try to obtain the named advisory lock without blocking.
    ///
    /// Returns `Ok(None)` when another holder owns the lock. The returned lock
    /// is released when it is dropped.
    fn try_lock(&self, name: &str) -> Result<Option<Box<dyn StorageLock>>>;

    /// Check whether the named lock is currently held by anyone.
    fn lock_exists(&self, name: &str) -> bool;

    /// Close the storage. Further operations fail with [`StorageError::StorageClosed`].
    fn close(&self) -> Result<()>;
}

/// A trait for reading data from storage.
pub trait StorageInput: Read + Seek + Send + std::fmt::Debug {
    /// Get the total size of the underlying file.
    fn size(&self) -> Result<u64>;

    /// Create an independent reader over the same file.
    ///
    /// The clone starts at the same position and moves independently.
    fn clone_input(&self) -> Result<Box<dyn StorageInput>>;
}

/// A trait for writing data to storage.
pub trait StorageOutput: Write + Seek + Send + std::fmt::Debug {
    /// Get the current write position.
    fn position(&self) -> Result<u64>;

    /// Flush all buffered data and publish the file.
    fn close(&mut self) -> Result<()>;
}

impl StorageOutput for Box<dyn StorageOutput> {
    fn position(&self) -> Result<u64> {
        self.as_ref().position()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

impl StorageInput for Box<dyn StorageInput> {
    fn size(&self) -> Result<u64> {
        self.as_ref().size()
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        self.as_ref().clone_input()
    }
}

/// Bookkeeping for the advisory locks of one storage backend.
pub trait LockManager: Send + Sync + std::fmt::Debug {
    /// Try to acquire a lock; `None` if already held.
    fn try_acquire_lock(&self, name: &str) -> Result<Option<Box<dyn StorageLock>>>;

    /// Check if a lock exists.
    fn lock_exists(&self, name: &str) -> bool;

    /// Release every lock handed out by this manager.
    fn release_all(&self) -> Result<()>;
}

/// A held advisory lock. Implementations release it on drop.
pub trait StorageLock: Send + std::fmt::Debug {
    /// Get the lock name.
    fn name(&self) -> &str;

    /// Release the lock explicitly. Releasing twice is a no-op.
    fn release(&mut self) -> Result<()>;

    /// Check if the lock is still held by this handle.
    fn is_valid(&self) -> bool;
}

/// Configuration for storage backends.
///
/// # Example
///
/// ```
/// use stratum::storage::StorageConfig;
/// use stratum::storage::file::FileStorageConfig;
///
/// let mut file_config = FileStorageConfig::new("/data/index");
/// file_config.buffer_size = 131072;
/// let config = StorageConfig::File(file_config);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageConfig {
    File(file::FileStorageConfig),

    Memory(memory::MemoryStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(memory::MemoryStorageConfig::default())
    }
}

/// A factory for creating storage instances.
pub struct StorageFactory;

impl StorageFactory {
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(mem_config) => {
                let storage = memory::MemoryStorage::new(mem_config);
                Ok(Arc::new(storage))
            }
            StorageConfig::File(file_config) => {
                let path = file_config.path.clone();
                let storage = file::FileStorage::new(&path, file_config)?;
                Ok(Arc::new(storage))
            }
        }
    }
}

/// Compare two storage handles by identity.
///
/// The index writer uses this to tell segments owned by its durable
/// directory from segments still living in its transient store or in a
/// foreign directory passed to `add_indexes`.
pub fn same_storage(a: &Arc<dyn Storage>, b: &Arc<dyn Storage>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Error types specific to storage operations.
#[derive(Debug, Clone)]
pub enum StorageError {
    FileNotFound(String),

    PermissionDenied(String),

    IoError(String),

    LockFailed(String),

    StorageClosed,
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::PermissionDenied(name) => write!(f, "Permission denied: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
            StorageError::LockFailed(name) => write!(f, "Failed to acquire lock: {name}"),
            StorageError::StorageClosed => write!(f, "Storage is closed"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for StratumError {
    fn from(err: StorageError) -> Self {
        StratumError::storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file::FileStorageConfig;
    use crate::storage::memory::MemoryStorageConfig;

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();

        match config {
            StorageConfig::Memory(mem_config) => {
                assert_eq!(mem_config.initial_capacity, 16);
            }
            _ => panic!("Expected Memory config"),
        }
    }

    #[test]
    fn test_file_storage_config() {
        let config = FileStorageConfig::new("/tmp/test");

        assert_eq!(config.path, std::path::PathBuf::from("/tmp/test"));
        assert_eq!(config.buffer_size, 65536);
        assert!(!config.sync_writes);
    }

    #[test]
    fn test_storage_config_json() {
        let config = StorageConfig::File(FileStorageConfig::new("/tmp/idx"));
        let json = serde_json::to_string(&config).unwrap();
        let parsed: StorageConfig = serde_json::from_str(&json).unwrap();
        match parsed {
            StorageConfig::File(file_config) => {
                assert_eq!(file_config.path, std::path::PathBuf::from("/tmp/idx"))
            }
            _ => panic!("Expected File config"),
        }
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::FileNotFound("test.txt".to_string());
        assert_eq!(err.to_string(), "File not found: test.txt");

        let err = StorageError::LockFailed("write".to_string());
        assert_eq!(err.to_string(), "Failed to acquire lock: write");

        let err = StorageError::StorageClosed;
        assert_eq!(err.to_string(), "Storage is closed");
    }

    #[test]
    fn test_storage_factory_memory() {
        let config = StorageConfig::Memory(MemoryStorageConfig::default());
        let storage = StorageFactory::create(config).unwrap();

        assert!(!storage.file_exists("test.txt"));
    }

    #[test]
    fn test_storage_factory_file() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let file_config = FileStorageConfig::new(temp_dir.path());
        let config = StorageConfig::File(file_config);
        let storage = StorageFactory::create(config).unwrap();

        assert!(!storage.file_exists("test.txt"));
    }

    #[test]
    fn test_same_storage() {
        let a = StorageFactory::create(StorageConfig::default()).unwrap();
        let b = StorageFactory::create(StorageConfig::default()).unwrap();
        let a2 = Arc::clone(&a);

        assert!(same_storage(&a, &a2));
        assert!(!same_storage(&a, &b));
    }
}
