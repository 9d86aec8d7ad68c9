use std::{
    fs::{self, File, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use fs4::FileExt;

use crate::core::error::PipelineError;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// An exclusive advisory file lock. Held for the lifetime of the value;
/// dropping releases the lock. The file itself stays in place: unlinking
/// on release would let a waiter lock an orphaned inode while another
/// process locks a fresh file at the same path, giving the key two
/// holders.
#[derive(Debug)]
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    /// Try to take the lock without waiting. `Ok(None)` means another
    /// process holds it.
    ///
    /// # Errors
    ///
    /// Returns an error when the lock file cannot be created or locking
    /// fails for a reason other than contention.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create lock dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open lock file {}", path.display()))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(LockFile {
                file,
                path: path.to_path_buf(),
            })),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to lock {}", path.display()))
            }
        }
    }

    /// Take the lock, polling until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// `PipelineError::LockTimeout` when the holder does not release in
    /// time; other errors pass through as fatal.
    pub fn acquire_wait(path: &Path, timeout: Duration) -> Result<Self, PipelineError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }
            if Instant::now() >= deadline {
                return Err(PipelineError::LockTimeout {
                    path: path.to_path_buf(),
                });
            }
            tracing::debug!(path = %path.display(), "lock busy, waiting");
            thread::sleep(POLL_INTERVAL.min(timeout));
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), %err, "failed to unlock");
        }
    }
}
