//! Advisory locking of the store directory.
//!
//! Uses flock() so that only one live store owns a directory at a time. The
//! lock is released when the `StoreLock` is dropped, or by the OS when the
//! process exits.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Lock file name placed in the store directory
pub const LOCK_FILE_NAME: &str = "passagedb.lock";

/// A held directory lock that releases on drop
#[derive(Debug)]
pub struct StoreLock {
    #[allow(dead_code)]
    file: File,
}

impl StoreLock {
    /// Attempt to acquire an exclusive lock on `dir` without blocking.
    ///
    /// Fails with `ErrorKind::WouldBlock` if another instance holds it.
    pub fn try_acquire(dir: &Path) -> io::Result<Self> {
        let lock_path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        Self::try_lock_exclusive(&file)?;

        Ok(StoreLock { file })
    }

    #[cfg(unix)]
    fn try_lock_exclusive(file: &File) -> io::Result<()> {
        let fd = file.as_raw_fd();
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock
                || err.raw_os_error() == Some(libc::EWOULDBLOCK)
                || err.raw_os_error() == Some(libc::EAGAIN)
            {
                return Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    "store directory is locked by another instance",
                ));
            }
            return Err(err);
        }
        Ok(())
    }

    // TODO: LockFileEx on Windows
    #[cfg(not(unix))]
    fn try_lock_exclusive(_file: &File) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
impl Drop for StoreLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // errors on unlock are not actionable here
        unsafe { libc::flock(fd, libc::LOCK_UN) };
    }
}
