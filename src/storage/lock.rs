//! Advisory file locking
//!
//! Uses `fs2` (flock on Unix, LockFileEx on Windows) so that a second process
//! opening the same store file fails instead of sharing the mapping.

use crate::storage::StoreError;
use fs2::FileExt;
use std::fs::File;
use std::path::Path;

/// Exclusive lock held on an open store file.
///
/// The OS drops the lock when the file handle closes.
#[derive(Debug)]
pub struct FileLock {
    held: bool,
}

impl FileLock {
    /// Try to take the exclusive lock without blocking.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyLocked` if another handle holds the lock.
    pub fn acquire(file: &File, path: &Path) -> Result<Self, StoreError> {
        match FileExt::try_lock_exclusive(file) {
            Ok(()) => Ok(Self { held: true }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(StoreError::AlreadyLocked {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Drop the lock for the duration of an operation that must not hold it
    pub fn release(&mut self, file: &File) -> Result<(), StoreError> {
        if self.held {
            FileExt::unlock(file)?;
            self.held = false;
        }
        Ok(())
    }

    /// Take the lock back, waiting for it if necessary
    pub fn reacquire(&mut self, file: &File) -> Result<(), StoreError> {
        if !self.held {
            FileExt::lock_exclusive(file)?;
            self.held = true;
        }
        Ok(())
    }

    #[cfg(test)]
    fn is_held(&self) -> bool {
        self.held
    }

    /// Release the lock for good
    pub fn unlock(mut self, file: &File) -> Result<(), StoreError> {
        self.release(file)
    }
}
