//! Index-level locks.
//!
//! Two named locks live in the index store. `write` is held by an index
//! writer for its whole lifetime (and by a reader from its first delete
//! until close). `commit` is taken briefly around every change to the
//! `segments` file and the file deletions that follow it. Both are single
//! non-blocking attempts; contention is reported, never waited out.

use std::sync::Arc;

use log::{debug, warn};

use crate::error::{Result, StratumError};
use crate::storage::{Storage, StorageLock};

pub const WRITE_LOCK_NAME: &str = "write";
pub const COMMIT_LOCK_NAME: &str = "commit";

/// Take the write lock of `storage`, failing with
/// [`StratumError::IndexLocked`] if another writer holds it.
///
/// The lock is released when the returned guard is dropped.
pub fn acquire_write_lock(storage: &dyn Storage) -> Result<Box<dyn StorageLock>> {
    storage
        .try_lock(WRITE_LOCK_NAME)?
        .ok_or_else(|| StratumError::IndexLocked(WRITE_LOCK_NAME.to_string()))
}

/// Run `body` while holding the commit lock of `storage`.
///
/// The lock is released on every exit path, including errors from `body`.
pub fn with_commit_lock<T, F>(storage: &dyn Storage, body: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let mut lock = storage
        .try_lock(COMMIT_LOCK_NAME)?
        .ok_or_else(|| StratumError::LockObtainFailed(COMMIT_LOCK_NAME.to_string()))?;
    debug!("obtained {COMMIT_LOCK_NAME} lock");

    let result = body();
    if let Err(e) = lock.release() {
        warn!("failed to release {COMMIT_LOCK_NAME} lock: {e}");
    }
    result
}

/// Write lock taken lazily by a reader on its first deletion.
#[derive(Debug)]
pub(crate) struct DeleteLock {
    storage: Option<Arc<dyn Storage>>,
    held: Option<Box<dyn StorageLock>>,
}

impl DeleteLock {
    /// A lock that is never taken.
    pub(crate) fn disabled() -> Self {
        DeleteLock {
            storage: None,
            held: None,
        }
    }

    pub(crate) fn new(storage: Arc<dyn Storage>) -> Self {
        DeleteLock {
            storage: Some(storage),
            held: None,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.storage.is_some()
    }

    /// Make sure the write lock is held.
    pub(crate) fn ensure(&mut self) -> Result<()> {
        if self.held.is_none()
            && let Some(storage) = &self.storage
        {
            self.held = Some(acquire_write_lock(storage.as_ref())?);
        }
        Ok(())
    }

    pub(crate) fn release(&mut self) -> Result<()> {
        match self.held.take() {
            Some(mut lock) => lock.release(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_write_lock_is_exclusive() {
        let storage = MemoryStorage::new_default();
        let first = acquire_write_lock(&storage).unwrap();
        assert!(matches!(
            acquire_write_lock(&storage),
            Err(StratumError::IndexLocked(_))
        ));
        drop(first);
        assert!(acquire_write_lock(&storage).is_ok());
    }

    #[test]
    fn test_commit_lock_released_on_error() {
        let storage = MemoryStorage::new_default();
        let result: Result<()> =
            with_commit_lock(&storage, || Err(StratumError::other("body failed")));
        assert!(result.is_err());
        assert!(!storage.lock_exists(COMMIT_LOCK_NAME));

        let value = with_commit_lock(&storage, || Ok(7)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_commit_lock_busy() {
        let storage = MemoryStorage::new_default();
        let _held = storage.try_lock(COMMIT_LOCK_NAME).unwrap().unwrap();
        let err = with_commit_lock(&storage, || Ok(())).unwrap_err();
        assert!(matches!(err, StratumError::LockObtainFailed(_)));
    }

    #[test]
    fn test_delete_lock() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());

        let mut disabled = DeleteLock::disabled();
        disabled.ensure().unwrap();
        assert!(!storage.lock_exists(WRITE_LOCK_NAME));

        let mut lock = DeleteLock::new(Arc::clone(&storage));
        lock.ensure().unwrap();
        lock.ensure().unwrap();
        assert!(storage.lock_exists(WRITE_LOCK_NAME));
        lock.release().unwrap();
        assert!(!storage.lock_exists(WRITE_LOCK_NAME));
    }
}
