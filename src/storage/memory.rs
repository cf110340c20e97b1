//! In-memory storage implementation.
//!
//! The index writer buffers freshly inverted single-document segments here
//! before merging them into durable storage. Tests also use it as a fast
//! stand-in for a directory.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{
    FileMetadata, LockManager, Storage, StorageError, StorageInput, StorageLock, StorageOutput,
};

/// Configuration for the in-memory backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStorageConfig {
    /// Expected number of files, used to size the file table.
    pub initial_capacity: usize,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        MemoryStorageConfig {
            initial_capacity: 16,
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    data: Arc<[u8]>,
    modified: u64,
}

type FileTable = Arc<Mutex<HashMap<String, MemoryFile>>>;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A storage backend that keeps every file in a shared map.
#[derive(Debug)]
pub struct MemoryStorage {
    files: FileTable,
    lock_manager: Arc<MemoryLockManager>,
    closed: AtomicBool,
}

impl MemoryStorage {
    pub fn new(config: MemoryStorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(Mutex::new(HashMap::with_capacity(config.initial_capacity))),
            lock_manager: Arc::new(MemoryLockManager::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn new_default() -> Self {
        Self::new(MemoryStorageConfig::default())
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StorageError::StorageClosed.into())
        } else {
            Ok(())
        }
    }

    /// Number of files currently stored.
    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    /// Total bytes held across all files.
    pub fn total_size(&self) -> u64 {
        self.files.lock().values().map(|f| f.data.len() as u64).sum()
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.check_closed()?;

        let files = self.files.lock();
        let file = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        Ok(Box::new(MemoryInput::new(Arc::clone(&file.data))))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.check_closed()?;

        Ok(Box::new(MemoryOutput::new(
            name.to_string(),
            Arc::clone(&self.files),
        )))
    }

    fn file_exists(&self, name: &str) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        self.files.lock().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.check_closed()?;

        self.files.lock().remove(name);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        self.check_closed()?;

        let mut file_names: Vec<String> = self.files.lock().keys().cloned().collect();
        file_names.sort();
        Ok(file_names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.check_closed()?;

        let files = self.files.lock();
        let file = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        Ok(file.data.len() as u64)
    }

    fn metadata(&self, name: &str) -> Result<FileMetadata> {
        self.check_closed()?;

        let files = self.files.lock();
        let file = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        Ok(FileMetadata {
            size: file.data.len() as u64,
            modified: file.modified,
        })
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.check_closed()?;

        let mut files = self.files.lock();
        let file = files
            .remove(old_name)
            .ok_or_else(|| StorageError::FileNotFound(old_name.to_string()))?;

        files.insert(new_name.to_string(), file);
        Ok(())
    }

    fn try_lock(&self, name: &str) -> Result<Option<Box<dyn StorageLock>>> {
        self.check_closed()?;
        self.lock_manager.try_acquire_lock(name)
    }

    fn lock_exists(&self, name: &str) -> bool {
        self.lock_manager.lock_exists(name)
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.lock_manager.release_all()?;
        Ok(())
    }
}

/// Reader over an immutable snapshot of a memory file.
#[derive(Debug)]
pub struct MemoryInput {
    cursor: Cursor<Arc<[u8]>>,
}

impl MemoryInput {
    fn new(data: Arc<[u8]>) -> Self {
        MemoryInput {
            cursor: Cursor::new(data),
        }
    }
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        let mut cursor = Cursor::new(Arc::clone(self.cursor.get_ref()));
        cursor.set_position(self.cursor.position());
        Ok(Box::new(MemoryInput { cursor }))
    }
}

/// Writer that publishes its buffer into the file table on close.
#[derive(Debug)]
pub struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    files: FileTable,
    position: u64,
    closed: bool,
}

impl MemoryOutput {
    fn new(name: String, files: FileTable) -> Self {
        MemoryOutput {
            name,
            buffer: Vec::new(),
            files,
            position: 0,
            closed: false,
        }
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::other("Output is closed"));
        }

        let start = self.position as usize;
        let end = start + buf.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        self.buffer[start..end].copy_from_slice(buf);
        self.position = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryOutput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        if self.closed {
            return Err(std::io::Error::other("Output is closed"));
        }

        let (base, offset) = match pos {
            SeekFrom::Start(offset) => {
                self.position = offset;
                return Ok(offset);
            }
            SeekFrom::End(offset) => (self.buffer.len() as u64, offset),
            SeekFrom::Current(offset) => (self.position, offset),
        };

        let new_pos = base.checked_add_signed(offset).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid seek position")
        })?;
        self.position = new_pos;
        Ok(new_pos)
    }
}

impl StorageOutput for MemoryOutput {
    fn position(&self) -> Result<u64> {
        Ok(self.position)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            let data: Arc<[u8]> = std::mem::take(&mut self.buffer).into();
            self.files.lock().insert(
                self.name.clone(),
                MemoryFile {
                    data,
                    modified: now_secs(),
                },
            );
            self.closed = true;
        }
        Ok(())
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Lock table shared by all locks of one memory storage.
///
/// Each acquisition gets a fresh ticket so a stale handle never releases a
/// lock that was re-acquired after `release_all`.
#[derive(Debug)]
pub struct MemoryLockManager {
    locks: Arc<Mutex<HashMap<String, u64>>>,
    next_ticket: AtomicU64,
}

impl MemoryLockManager {
    fn new() -> Self {
        MemoryLockManager {
            locks: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: AtomicU64::new(0),
        }
    }
}

impl LockManager for MemoryLockManager {
    fn try_acquire_lock(&self, name: &str) -> Result<Option<Box<dyn StorageLock>>> {
        let mut locks = self.locks.lock();
        if locks.contains_key(name) {
            return Ok(None);
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        locks.insert(name.to_string(), ticket);

        Ok(Some(Box::new(MemoryLock {
            name: name.to_string(),
            ticket,
            locks: Arc::clone(&self.locks),
            released: false,
        })))
    }

    fn lock_exists(&self, name: &str) -> bool {
        self.locks.lock().contains_key(name)
    }

    fn release_all(&self) -> Result<()> {
        self.locks.lock().clear();
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryLock {
    name: String,
    ticket: u64,
    locks: Arc<Mutex<HashMap<String, u64>>>,
    released: bool,
}

impl StorageLock for MemoryLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            let mut locks = self.locks.lock();
            if locks.get(&self.name) == Some(&self.ticket) {
                locks.remove(&self.name);
            }
            self.released = true;
        }
        Ok(())
    }

    fn is_valid(&self) -> bool {
        !self.released && self.locks.lock().get(&self.name) == Some(&self.ticket)
    }
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
