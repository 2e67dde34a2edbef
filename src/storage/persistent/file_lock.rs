//! Exclusive lock on a history directory.
//!
//! Only one process may own a history log at a time. The lock is taken
//! without blocking and released when the [`DirectoryLock`] is dropped.

use std::fs::{File, OpenOptions};
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};

use crate::storage::StorageError;

const LOCK_FILE_NAME: &str = "history.lock";

/// Holds the exclusive lock for as long as it lives.
#[derive(Debug)]
pub struct DirectoryLock {
    _file: File,
    path: PathBuf,
}

impl DirectoryLock {
    /// Locks `dir`, failing with [`StorageError::Locked`] if another process owns it.
    pub fn acquire(dir: &Path) -> Result<Self, StorageError> {
        let path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match lock_exclusive(&file) {
            Ok(()) => Ok(Self { _file: file, path }),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                Err(StorageError::Locked(dir.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> IoResult<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and stays open for the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(());
    }
    let err = IoError::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Err(IoError::new(ErrorKind::WouldBlock, "history directory is locked"));
    }
    Err(err)
}

#[cfg(windows)]
fn lock_exclusive(file: &File) -> IoResult<()> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::Foundation::HANDLE;
    use windows_sys::Win32::Storage::FileSystem::{
        LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
    };
    use windows_sys::Win32::System::IO::OVERLAPPED;

    let handle = file.as_raw_handle() as HANDLE;
    // SAFETY: the handle is owned by `file`; OVERLAPPED is plain data.
    let rc = unsafe {
        let mut overlapped = std::mem::zeroed::<OVERLAPPED>();
        LockFileEx(
            handle,
            LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
            0,
            1,
            0,
            &mut overlapped,
        )
    };
    if rc == 0 {
        return Err(IoError::new(ErrorKind::WouldBlock, IoError::last_os_error()));
    }
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn lock_exclusive(_file: &File) -> IoResult<()> {
    Err(IoError::new(
        ErrorKind::Unsupported,
        "file locking not supported on this platform",
    ))
}
