//! File-based storage implementation.
//!
//! Every index file is a regular file in one directory. Inputs share the
//! underlying [`File`] handle behind a mutex and keep their own position and
//! read buffer, so `clone_input` is cheap and clones never disturb each other.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StratumError};
use crate::storage::{
    FileMetadata, LockManager, Storage, StorageError, StorageInput, StorageLock, StorageOutput,
};

/// Configuration for the file backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Directory holding the index files.
    pub path: PathBuf,

    /// Read and write buffer size in bytes.
    pub buffer_size: usize,

    /// Call `fsync` when an output is closed.
    pub sync_writes: bool,
}

impl FileStorageConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorageConfig {
            path: path.as_ref().to_path_buf(),
            buffer_size: 65536,
            sync_writes: false,
        }
    }
}

fn map_open_error(name: &str, e: std::io::Error) -> StorageError {
    match e.kind() {
        std::io::ErrorKind::NotFound => StorageError::FileNotFound(name.to_string()),
        std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(name.to_string()),
        _ => StorageError::IoError(e.to_string()),
    }
}

/// A storage backend rooted at one directory.
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
    config: FileStorageConfig,
    lock_manager: Arc<FileLockManager>,
    closed: AtomicBool,
}

impl FileStorage {
    /// Open (creating if needed) the directory as a storage.
    pub fn new<P: AsRef<Path>>(directory: P, config: FileStorageConfig) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();

        if !directory.exists() {
            std::fs::create_dir_all(&directory)
                .map_err(|e| StratumError::storage(format!("Failed to create directory: {e}")))?;
        }

        if !directory.is_dir() {
            return Err(StratumError::storage(format!(
                "Path is not a directory: {}",
                directory.display()
            )));
        }

        let lock_manager = Arc::new(FileLockManager::new(directory.clone()));

        Ok(FileStorage {
            directory,
            config,
            lock_manager,
            closed: AtomicBool::new(false),
        })
    }

    /// Open a directory with default settings.
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let config = FileStorageConfig::new(directory.as_ref());
        Self::new(directory, config)
    }

    /// The directory this storage is rooted at.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StorageError::StorageClosed.into())
        } else {
            Ok(())
        }
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.check_closed()?;

        let file = File::open(self.file_path(name)).map_err(|e| map_open_error(name, e))?;
        Ok(Box::new(FileInput::new(file, self.config.buffer_size)?))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.check_closed()?;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.file_path(name))
            .map_err(|e| map_open_error(name, e))?;

        Ok(Box::new(FileOutput::new(
            file,
            self.config.buffer_size,
            self.config.sync_writes,
        )))
    }

    fn file_exists(&self, name: &str) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        self.file_path(name).exists()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.check_closed()?;

        let path = self.file_path(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| StorageError::IoError(format!("Failed to delete {name}: {e}")))?;
        }

        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        self.check_closed()?;

        let mut files = Vec::new();
        for entry in
            std::fs::read_dir(&self.directory).map_err(|e| StorageError::IoError(e.to_string()))?
        {
            let entry = entry.map_err(|e| StorageError::IoError(e.to_string()))?;
            let path = entry.path();

            if path.is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                files.push(name.to_string());
            }
        }

        files.sort();
        Ok(files)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(self.metadata(name)?.size)
    }

    fn metadata(&self, name: &str) -> Result<FileMetadata> {
        self.check_closed()?;

        let metadata = self
            .file_path(name)
            .metadata()
            .map_err(|e| map_open_error(name, e))?;

        let modified = metadata
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Ok(FileMetadata {
            size: metadata.len(),
            modified,
        })
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.check_closed()?;

        std::fs::rename(self.file_path(old_name), self.file_path(new_name)).map_err(|e| {
            StorageError::IoError(format!("Failed to rename {old_name} to {new_name}: {e}"))
        })?;

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

/// A buffered reader over a shared file handle.
#[derive(Debug)]
pub struct FileInput {
    file: Arc<Mutex<File>>,
    size: u64,
    buffer: Vec<u8>,
    buffer_start: u64,
    cursor: usize,
    buffer_size: usize,
}

impl FileInput {
    fn new(file: File, buffer_size: usize) -> Result<Self> {
        let size = file
            .metadata()
            .map_err(|e| StratumError::storage(format!("Failed to get file metadata: {e}")))?
            .len();

        Ok(FileInput {
            file: Arc::new(Mutex::new(file)),
            size,
            buffer: Vec::new(),
            buffer_start: 0,
            cursor: 0,
            buffer_size: buffer_size.max(1),
        })
    }

    fn position(&self) -> u64 {
        self.buffer_start + self.cursor as u64
    }

    fn refill(&mut self) -> std::io::Result<()> {
        let start = self.position();
        self.buffer_start = start;
        self.cursor = 0;
        self.buffer.resize(self.buffer_size, 0);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(start))?;
        let mut filled = 0;
        while filled < self.buffer.len() {
            let n = file.read(&mut self.buffer[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.buffer.truncate(filled);
        Ok(())
    }
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.cursor >= self.buffer.len() {
            self.refill()?;
            if self.buffer.is_empty() {
                return Ok(0);
            }
        }

        let available = &self.buffer[self.cursor..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.cursor += n;
        Ok(n)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.size.checked_add_signed(offset),
            SeekFrom::Current(offset) => self.position().checked_add_signed(offset),
        }
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid seek position")
        })?;

        let buffer_end = self.buffer_start + self.buffer.len() as u64;
        if target >= self.buffer_start && target <= buffer_end {
            self.cursor = (target - self.buffer_start) as usize;
        } else {
            self.buffer.clear();
            self.buffer_start = target;
            self.cursor = 0;
        }
        Ok(target)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        Ok(Box::new(FileInput {
            file: Arc::clone(&self.file),
            size: self.size,
            buffer: Vec::new(),
            buffer_start: self.position(),
            cursor: 0,
            buffer_size: self.buffer_size,
        }))
    }
}

/// A buffered writer over a freshly created file.
#[derive(Debug)]
pub struct FileOutput {
    writer: BufWriter<File>,
    sync_writes: bool,
    position: u64,
}

impl FileOutput {
    fn new(file: File, buffer_size: usize, sync_writes: bool) -> Self {
        FileOutput {
            writer: BufWriter::with_capacity(buffer_size, file),
            sync_writes,
            position: 0,
        }
    }
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let bytes_written = self.writer.write(buf)?;
        self.position += bytes_written as u64;
        Ok(bytes_written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl Seek for FileOutput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = self.writer.seek(pos)?;
        self.position = new_pos;
        Ok(new_pos)
    }
}

impl StorageOutput for FileOutput {
    fn position(&self) -> Result<u64> {
        Ok(self.position)
    }

    fn close(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| StratumError::storage(format!("Failed to flush: {e}")))?;

        if self.sync_writes {
            self.writer
                .get_ref()
                .sync_all()
                .map_err(|e| StratumError::storage(format!("Failed to sync: {e}")))?;
        }

        Ok(())
    }
}

/// Lock files of the form `<name>.lock` inside the storage directory.
#[derive(Debug)]
pub struct FileLockManager {
    directory: PathBuf,
    held: Arc<Mutex<HashSet<String>>>,
}

impl FileLockManager {
    fn new(directory: PathBuf) -> Self {
        FileLockManager {
            directory,
            held: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.lock"))
    }
}

impl LockManager for FileLockManager {
    fn try_acquire_lock(&self, name: &str) -> Result<Option<Box<dyn StorageLock>>> {
        let lock_path = self.lock_path(name);

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(StorageError::IoError(e.to_string()).into()),
        }

        self.held.lock().insert(name.to_string());

        Ok(Some(Box::new(FileLock {
            name: name.to_string(),
            path: lock_path,
            held: Arc::clone(&self.held),
            released: false,
        })))
    }

    fn lock_exists(&self, name: &str) -> bool {
        self.lock_path(name).exists()
    }

    fn release_all(&self) -> Result<()> {
        let names: Vec<String> = self.held.lock().drain().collect();
        for name in names {
            let path = self.lock_path(&name);
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| {
                    StorageError::IoError(format!("Failed to release lock {name}: {e}"))
                })?;
            }
        }
        Ok(())
    }
}

/// A held lock file, removed on release or drop.
#[derive(Debug)]
pub struct FileLock {
    name: String,
    path: PathBuf,
    held: Arc<Mutex<HashSet<String>>>,
    released: bool,
}

impl StorageLock for FileLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        // release_all may already have removed it
        if self.held.lock().remove(&self.name) && self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| {
                StorageError::IoError(format!("Failed to release lock {}: {e}", self.name))
            })?;
        }
        Ok(())
    }

    fn is_valid(&self) -> bool {
        !self.released && self.held.lock().contains(&self.name) && self.path.exists()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("{e}");
        }
    }
}
