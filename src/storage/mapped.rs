//! Memory-mapped store file with bounds-checked access

use crate::storage::{FileLock, StoreError};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An open, locked and mapped store file.
///
/// Every read and write goes through `read`/`write`, which validate the
/// range against the mapped length.
#[derive(Debug)]
pub struct MappedFile {
    path: PathBuf,
    file: File,
    map: MmapMut,
    lock: FileLock,
}

impl MappedFile {
    /// Open an existing file, or create one of `size` bytes.
    ///
    /// Returns the mapping and whether the file was newly created. An
    /// existing file must have exactly `size` bytes.
    pub fn open_or_create(path: &Path, size: usize) -> Result<(Self, bool), StoreError> {
        let created = !path.exists();
        if created {
            if let Some(dir) = path.parent() {
                if !dir.as_os_str().is_empty() && !dir.exists() {
                    fs::create_dir_all(dir)?;
                }
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let lock = FileLock::acquire(&file, path)?;

        if created {
            file.set_len(size as u64)?;
            debug!(path = %path.display(), size, "created store file");
        } else {
            let actual = file.metadata()?.len();
            if actual != size as u64 {
                return Err(StoreError::SizeMismatch {
                    path: path.to_path_buf(),
                    expected: size as u64,
                    actual,
                });
            }
        }

        // SAFETY: the exclusive advisory lock keeps cooperating processes from
        // resizing or writing the file while it is mapped.
        let map = unsafe { MmapOptions::new().len(size).map_mut(&file)? };

        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                map,
                lock,
            },
            created,
        ))
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), StoreError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.map.len() => Ok(()),
            _ => Err(StoreError::OutOfBounds {
                offset,
                len,
                size: self.map.len(),
            }),
        }
    }

    /// Borrow `len` bytes at `offset`
    pub fn read(&self, offset: usize, len: usize) -> Result<&[u8], StoreError> {
        self.check(offset, len)?;
        Ok(&self.map[offset..offset + len])
    }

    /// Copy `bytes` to `offset`
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError> {
        self.check(offset, bytes.len())?;
        self.map[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Zero a range
    pub fn zero(&mut self, offset: usize, len: usize) -> Result<(), StoreError> {
        self.check(offset, len)?;
        self.map[offset..offset + len].fill(0);
        Ok(())
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32, StoreError> {
        let b = self.read(offset, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<(), StoreError> {
        self.write(offset, &value.to_be_bytes())
    }

    /// Flush dirty pages to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.map.flush()?;
        Ok(())
    }

    /// Copy the whole file to `target` with the advisory lock released.
    ///
    /// The lock is taken back even when the copy fails; only a failure to
    /// re-lock is returned as an error, the copy result is handed back.
    pub fn copy_unlocked(&mut self, target: &Path) -> Result<std::io::Result<u64>, StoreError> {
        self.flush()?;
        self.lock.release(&self.file)?;
        let copied = fs::copy(&self.path, target);
        self.lock.reacquire(&self.file)?;
        Ok(copied)
    }

    /// Flush, unmap and unlock
    pub fn close(self) -> Result<(), StoreError> {
        self.map.flush()?;
        let MappedFile { file, map, lock, .. } = self;
        drop(map);
        lock.unlock(&file)?;
        drop(file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ring.dat");

        let (mut mapped, created) = MappedFile::open_or_create(&path, 2048).unwrap();
        assert!(created);
        mapped.write_u32(4, 1024).unwrap();
        mapped.close().unwrap();

        let (mapped, created) = MappedFile::open_or_create(&path, 2048).unwrap();
        assert!(!created);
        assert_eq!(mapped.read_u32(4).unwrap(), 1024);
    }

    #[test]
    fn test_size_mismatch_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ring.dat");
        MappedFile::open_or_create(&path, 2048).unwrap().0.close().unwrap();

        assert!(matches!(
            MappedFile::open_or_create(&path, 4096),
            Err(StoreError::SizeMismatch { expected: 4096, actual: 2048, .. })
        ));
    }

    #[test]
    fn test_out_of_bounds_access() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ring.dat");
        let (mut mapped, _) = MappedFile::open_or_create(&path, 1024).unwrap();

        assert!(mapped.read(1020, 4).is_ok());
        assert!(matches!(mapped.read(1021, 4), Err(StoreError::OutOfBounds { .. })));
        assert!(mapped.write(usize::MAX, &[1]).is_err());
    }

    #[test]
    fn test_copy_unlocked_keeps_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ring.dat");
        let (mut mapped, _) = MappedFile::open_or_create(&path, 1024).unwrap();
        mapped.write(0, b"TEST").unwrap();

        let target = dir.path().join("copy.dat");
        let copied = mapped.copy_unlocked(&target).unwrap().unwrap();
        assert_eq!(copied, 1024);
        assert_eq!(&fs::read(&target).unwrap()[..4], b"TEST");

        assert!(matches!(
            MappedFile::open_or_create(&path, 1024),
            Err(StoreError::AlreadyLocked { .. })
        ));
    }
}
