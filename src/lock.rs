//! Advisory lock held for the length of a run.
//!
//! Two overlapping runs against the same log would read the same lines and
//! race on the offset. The lock is an exclusive `flock` on a file in the state
//! directory, taken without blocking. The kernel drops it when the process
//! exits, so a crashed run never leaves a stale lock behind.

use libc;
use std::fs;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// An exclusive lock, released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: fs::File,
}

impl RunLock {
    /// Take the lock at `path`, creating the file if needed. Fails with
    /// `io::ErrorKind::WouldBlock` if another process holds it.
    pub fn acquire<P: AsRef<Path>>(path: P) -> io::Result<RunLock> {
        let path = path.as_ref().to_path_buf();
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)?;
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        trace!("locked {}", path.display());
        Ok(RunLock {
            path: path,
            file: file,
        })
    }

    /// The lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        trace!("unlocked {}", self.path.display());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn second_lock_fails_until_released() {
        let dir = TempDir::new("logster-lock").unwrap();
        let path = dir.path().join("access.log.lock");

        let held = RunLock::acquire(&path).unwrap();
        assert_eq!(held.path(), path.as_path());
        match RunLock::acquire(&path) {
            Err(e) => assert_eq!(e.kind(), io::ErrorKind::WouldBlock),
            Ok(_) => panic!("lock taken twice"),
        }

        drop(held);
        assert!(RunLock::acquire(&path).is_ok());
    }

    #[test]
    fn distinct_files_do_not_conflict() {
        let dir = TempDir::new("logster-lock").unwrap();
        let _a = RunLock::acquire(dir.path().join("a.lock")).unwrap();
        let _b = RunLock::acquire(dir.path().join("b.lock")).unwrap();
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new("logster-lock").unwrap();
        assert!(RunLock::acquire(dir.path().join("no/such/dir.lock")).is_err());
    }
}
