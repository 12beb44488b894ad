use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use crate::Result;

/// A file-based exclusive lock guarding writes to one key of a [`FileStore`](crate::FileStore).
///
/// Lock path: `{store_dir}/.locks/{key}.lock`
///
/// The lock is released when the guard is dropped. The lock file stays: removing
/// it would let a waiter hold a lock on an unlinked file while a newcomer locks
/// a fresh one at the same path.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    _lock_file: File,
}

impl StoreLock {
    pub fn new(dir: &Path, key: &str) -> Result<Self> {
        let path = Self::lock_path(dir, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.lock_exclusive()?;

        log::debug!("acquired store lock at {}", path.display());
        Ok(Self {
            _lock_file: file,
            path,
        })
    }

    pub fn lock_path(dir: &Path, key: &str) -> PathBuf {
        dir.join(".locks").join(format!("{}.lock", key))
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        log::debug!("released store lock at {}", self.path.display());
    }
}
