//! Cross-process run lock
//!
//! One run at a time per state directory. The lock file records who holds
//! it so a second run can say what it is waiting on; it never waits.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};

use crate::config::defaults::LOCK_FILE;
use crate::error::LockError;
use crate::infra::filesystem;

/// Holder information written into the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub started_at_unix: u64,
    pub command: String,
}

impl std::fmt::Display for LockHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' (pid {}, started at unix time {})",
            self.command, self.pid, self.started_at_unix
        )
    }
}

/// Exclusive lock over a state directory, released on drop
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock of `state_dir` or fail immediately
    pub fn acquire(state_dir: &Path, command: &str) -> Result<Self, LockError> {
        let path = state_dir.join(LOCK_FILE);
        let lock_failed = |e: String| LockError::LockFailed {
            path: path.clone(),
            error: e,
        };

        filesystem::create_dir_all(state_dir).map_err(|e| lock_failed(e.to_string()))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| lock_failed(e.to_string()))?;

        match file.try_lock_exclusive() {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(LockError::Contention {
                    holder: read_holder(&path).map(|h| h.to_string()),
                    path,
                });
            }
            Err(e) => return Err(lock_failed(e.to_string())),
        }

        write_holder(&file, command).map_err(|e| lock_failed(e.to_string()))?;
        tracing::debug!(path = %path.display(), "run lock acquired");

        Ok(Self { file, path })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release run lock");
        } else {
            tracing::debug!(path = %self.path.display(), "run lock released");
        }
    }
}

fn write_holder(mut file: &File, command: &str) -> io::Result<()> {
    let holder = LockHolder {
        pid: std::process::id(),
        started_at_unix: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
        command: command.to_string(),
    };

    file.set_len(0)?;
    let json = serde_json::to_string(&holder).map_err(io::Error::other)?;
    file.write_all(json.as_bytes())?;
    file.flush()
}

/// Holder recorded in the lock file at `path`, if readable
pub fn read_holder(path: &Path) -> Option<LockHolder> {
    let mut contents = String::new();
    File::open(path).ok()?.read_to_string(&mut contents).ok()?;
    serde_json::from_str(&contents).ok()
}
