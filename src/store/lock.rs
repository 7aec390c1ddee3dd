//! Exclusive writer lock on the index.
//!
//! A read-write session holds an `flock` on `<db>.lock` for its whole
//! lifetime. The kernel drops the lock when the file is closed, including
//! when the process dies, so an interrupted batch never leaves a stale lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Held writer lock; released on drop.
#[derive(Debug)]
pub struct WriterLock {
    path: PathBuf,
    _file: File,
}

impl WriterLock {
    /// Try to take the lock without waiting.
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        try_lock_exclusive(&file).map_err(|e| {
            if is_contended(&e) {
                StoreError::Locked {
                    path: path.to_path_buf(),
                }
            } else {
                StoreError::Io(e)
            }
        })?;

        tracing::debug!(path = %path.display(), "Writer lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        tracing::debug!(path = %self.path.display(), "Writer lock released");
    }
}

/// Lock file used for a database at `db_path`.
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn is_contended(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::EWOULDBLOCK)
}

#[cfg(not(unix))]
fn is_contended(_err: &std::io::Error) -> bool {
    false
}
