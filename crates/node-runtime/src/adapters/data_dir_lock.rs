//! # Data Directory Lock
//!
//! An exclusive `fs2` lock on `data_dir/LOCK`, held for the life of the
//! node, so two processes never append to the same mailbox record file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info};

use shared_types::RelayError;

/// Held lock on a data directory. Released on drop.
#[derive(Debug)]
pub struct DataDirLock {
    file: File,
    path: PathBuf,
}

impl DataDirLock {
    const LOCK_FILE: &'static str = "LOCK";

    /// Take the lock without waiting.
    ///
    /// # Errors
    /// `Storage` if the directory cannot be created or another process
    /// already holds the lock.
    pub fn acquire(data_dir: &Path) -> Result<Self, RelayError> {
        std::fs::create_dir_all(data_dir).map_err(|e| {
            RelayError::Storage(format!("failed to create {}: {}", data_dir.display(), e))
        })?;
        let path = data_dir.join(Self::LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| RelayError::Storage(format!("failed to open {}: {}", path.display(), e)))?;

        if file.try_lock_exclusive().is_err() {
            let holder = std::fs::read_to_string(&path).unwrap_or_default();
            return Err(RelayError::Storage(format!(
                "data directory {} is in use by process {}",
                data_dir.display(),
                holder.trim()
            )));
        }

        // Only the holder rewrites the pid.
        file.set_len(0)
            .and_then(|_| writeln!(file, "{}", std::process::id()))
            .and_then(|_| file.sync_all())
            .map_err(|e| RelayError::Storage(format!("failed to write {}: {}", path.display(), e)))?;

        info!(path = %path.display(), "Data directory locked");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "Data directory unlocked");
    }
}
