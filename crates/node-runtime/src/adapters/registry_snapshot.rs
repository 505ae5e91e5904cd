//! # Registry Snapshot
//!
//! The registry lives in memory. With the file backend its records are
//! written to a snapshot file on a timer and at shutdown, and merged back at
//! start. Peers fill in anything newer through registry replication.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use mr_01_registry::{RegistryApi, RegistryRecord};
use shared_types::RelayError;

const PAGE: usize = 1_024;

fn io_error(err: std::io::Error) -> RelayError {
    RelayError::Storage(err.to_string())
}

/// Snapshot file of every registry record, live and removed.
pub struct RegistrySnapshot {
    path: PathBuf,
}

impl RegistrySnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge the snapshot into `registry`. A missing file loads nothing.
    pub fn load_into(&self, registry: &dyn RegistryApi) -> Result<usize, RelayError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_error(e)),
        };
        let records: Vec<RegistryRecord> = bincode::deserialize(&bytes)
            .map_err(|e| RelayError::Storage(format!("corrupt registry snapshot: {}", e)))?;

        let count = records.len();
        for record in records {
            registry.merge(record);
        }
        info!(path = %self.path.display(), records = count, "Registry snapshot loaded");
        Ok(count)
    }

    /// Write every record to a temporary file, then rename it into place.
    pub fn save(&self, registry: &dyn RegistryApi) -> Result<usize, RelayError> {
        let mut records = Vec::new();
        let mut since = 0;
        loop {
            let page = registry.changes_since(since, PAGE);
            let done = page.records.is_empty() || page.through >= page.head;
            since = page.through;
            records.extend(page.records);
            if done {
                break;
            }
        }

        let bytes = bincode::serialize(&records)
            .map_err(|e| RelayError::Storage(format!("failed to encode registry: {}", e)))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp).map_err(io_error)?;
            file.write_all(&bytes).map_err(io_error)?;
            file.sync_all().map_err(io_error)?;
        }
        fs::rename(&tmp, &self.path).map_err(io_error)?;

        debug!(path = %self.path.display(), records = records.len(), "Registry snapshot written");
        Ok(records.len())
    }
}
