//! Single instance lock for long running tablet sessions

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use directories::ProjectDirs;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not determine lock file path")]
    NoPath,
    #[error("another stu-sync session already owns the tablet ({})", .0.display())]
    Held(PathBuf),
    #[error("failed to create lock file: {0}")]
    Io(#[from] io::Error),
}

/// Guard that holds the lock file open. Lock is released when dropped.
pub struct Lock {
    _file: File,
    path: PathBuf,
}

impl Lock {
    /// Acquire the default session lock
    pub fn acquire() -> Result<Self, LockError> {
        let path = ProjectDirs::from("", "", "stu-sync")
            .map(|dirs| dirs.config_dir().join("stu-sync.lock"))
            .ok_or(LockError::NoPath)?;
        Self::acquire_at(path)
    }

    /// Acquire an exclusive, non-blocking lock on `path`
    pub fn acquire_at(path: PathBuf) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        if file.try_lock().is_err() {
            return Err(LockError::Held(path));
        }

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "acquired session lock");
        Ok(Self { _file: file, path })
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
