//! File-based locking to prevent concurrent backup runs

use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const LOCK_FILE: &str = ".backup.lock";

/// Exclusive lock over a backup directory
///
/// The OS lock lives as long as the file descriptor; dropping the guard
/// closes it, which releases the lock.
pub struct RunLock {
    _lock: RwLock<File>,
    lock_path: PathBuf,
}

impl RunLock {
    /// Try to take the lock; `Ok(None)` if another run holds it
    pub fn try_acquire(backup_dir: &Path) -> io::Result<Option<Self>> {
        let lock_path = backup_dir.join(LOCK_FILE);

        debug!("Attempting to acquire lock: {:?}", lock_path);

        std::fs::create_dir_all(backup_dir)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        let mut lock = RwLock::new(file);

        match lock.try_write() {
            Ok(guard) => {
                // The flock stays held until the descriptor inside `lock` closes
                std::mem::forget(guard);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e),
        }

        info!("Acquired run lock: {:?}", lock_path);

        Ok(Some(Self {
            _lock: lock,
            lock_path,
        }))
    }

    /// Get the lock file path (for inspection)
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        info!("Released run lock: {:?}", self.lock_path);
    }
}
