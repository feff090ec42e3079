use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_LOCK_PATH: &str = "/run/uupd.lock";

/// Host-wide single-instance guard backed by an advisory lock on a file.
///
/// Acquisition never blocks. The lock is released when the guard is dropped,
/// and by the kernel if the process dies.
#[derive(Debug)]
pub struct InstanceLock {
    lock_file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn try_acquire(lock_path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if is_contended(&e) => {
                return Err(CoreError::AlreadyRunning(lock_path.to_path_buf()));
            }
            Err(e) => return Err(CoreError::Io(e)),
        }

        // Holder pid, for whoever inspects the file by hand.
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", std::process::id())?;

        debug!("acquired instance lock {}", lock_path.display());
        Ok(Self {
            lock_file: file,
            path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
        debug!("released instance lock {}", self.path.display());
    }
}
