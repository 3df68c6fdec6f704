// Copyright 2025 Stoolap Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Exclusive ownership of a frequency store directory.
//!
//! Two processes appending to the same counter log would interleave records
//! and break recovery, so a store directory is owned by one process at a time
//! through an OS-level lock (`flock()` on Unix, `LockFileEx()` on Windows).

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::{Error, Result};

/// Name of the lock file inside a store directory
pub const LOCK_FILE_NAME: &str = "advisor.lock";

/// Exclusive lock on a store directory, released on drop
#[derive(Debug)]
pub struct StoreLock {
    /// Kept open to hold the lock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock for `dir`, creating the directory if needed.
    ///
    /// Fails with [`Error::DatabaseLocked`] when another process holds it.
    pub fn acquire(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| {
            Error::store_unavailable(format!("failed to create store directory: {}", e))
        })?;

        let path = dir.join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::store_unavailable(format!("failed to open lock file: {}", e)))?;

        lock_exclusive(&file)?;

        // Holder pid, informational only. Cleared only once the lock is ours
        if file.set_len(0).is_ok() {
            write!(file, "{}", std::process::id()).ok();
            file.sync_all().ok();
        }

        Ok(Self { file, path })
    }

    /// Path to the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    // LOCK_NB: fail instead of waiting for the other process
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        return Ok(());
    }

    let errno = std::io::Error::last_os_error();
    if errno.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Err(Error::DatabaseLocked);
    }
    Err(Error::LockAcquisitionFailed(errno.to_string()))
}

#[cfg(windows)]
fn lock_exclusive(file: &File) -> Result<()> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
    use windows_sys::Win32::Storage::FileSystem::{
        LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
    };
    use windows_sys::Win32::System::IO::OVERLAPPED;

    let handle = file.as_raw_handle() as HANDLE;
    let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };

    let result = unsafe {
        LockFileEx(
            handle,
            LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
            0,
            1,
            0,
            &mut overlapped,
        )
    };
    if result != 0 {
        return Ok(());
    }

    let error = std::io::Error::last_os_error();
    if error.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) {
        return Err(Error::DatabaseLocked);
    }
    Err(Error::LockAcquisitionFailed(error.to_string()))
}

#[cfg(not(any(unix, windows)))]
fn lock_exclusive(_file: &File) -> Result<()> {
    tracing::warn!("file locking not supported on this platform, store directory is unprotected");
    Ok(())
}
