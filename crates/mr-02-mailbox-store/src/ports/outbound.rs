//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the Mailbox Store requires from the host application.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind as IoErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use shared_types::{Fingerprint, LogEntry, OwnerCommitment, RelayError};

/// Who owns a mailbox.
///
/// Production: backed by the Registry (node-service adapter).
pub trait OwnerDirectory: Send + Sync {
    /// Commitment of the owner registered for `fingerprint`, if any.
    fn owner_of(&self, fingerprint: &Fingerprint) -> Option<OwnerCommitment>;

    /// Every commitment that has ever held `fingerprint`, current or past.
    fn owner_history(&self, fingerprint: &Fingerprint) -> Vec<OwnerCommitment>;

    /// Whether `owner` appears on any registration this node has seen.
    fn knows_owner(&self, owner: &OwnerCommitment) -> bool;
}

/// One persisted mailbox log slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub fingerprint: Fingerprint,
    pub entry: LogEntry,
}

/// Durable record of every mailbox log entry.
///
/// Testing: `InMemoryPersistence` (below)
/// Production: `FileBackedPersistence` (below)
pub trait MailboxPersistence: Send + Sync {
    /// Every entry ever persisted, in write order.
    fn load(&self) -> Result<Vec<PersistedEntry>, RelayError>;

    /// Durably record a batch of entries. All or nothing from the caller's view.
    fn persist(&self, entries: &[PersistedEntry]) -> Result<(), RelayError>;

    /// Atomically replace everything persisted with `entries`.
    fn rewrite(&self, entries: &[PersistedEntry]) -> Result<(), RelayError>;
}

// =============================================================================
// ADAPTER IMPLEMENTATIONS
// =============================================================================

/// Volatile persistence for tests and single-run nodes.
#[derive(Default)]
pub struct InMemoryPersistence {
    entries: Mutex<Vec<PersistedEntry>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MailboxPersistence for InMemoryPersistence {
    fn load(&self) -> Result<Vec<PersistedEntry>, RelayError> {
        Ok(self.entries.lock().clone())
    }

    fn persist(&self, entries: &[PersistedEntry]) -> Result<(), RelayError> {
        self.entries.lock().extend_from_slice(entries);
        Ok(())
    }

    fn rewrite(&self, entries: &[PersistedEntry]) -> Result<(), RelayError> {
        *self.entries.lock() = entries.to_vec();
        Ok(())
    }
}

/// Append-only record file.
///
/// Format: `[len: u32 LE][crc32: u32 LE][bincode(PersistedEntry)]...`. One
/// `persist` call is written with a single `write_all` and synced before
/// returning. A torn or checksum-failing record at the tail (crash
/// mid-write) is dropped on open and overwritten by the next write; a bad
/// record anywhere else fails the open.
pub struct FileBackedPersistence {
    path: PathBuf,
    file: Mutex<File>,
}

/// Bytes of framing ahead of each record.
const HEADER_LEN: u64 = 8;

impl FileBackedPersistence {
    /// Open (or create) the record file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RelayError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let valid_len = Self::scan(&path)?.1;
        let file = Self::open_file(&path)?;
        if file.metadata().map_err(io_error)?.len() > valid_len {
            tracing::warn!(path = %path.display(), valid_len, "Truncating torn record at tail");
            file.set_len(valid_len).map_err(io_error)?;
        }

        tracing::info!(path = %path.display(), bytes = valid_len, "Opened mailbox record file");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_file(path: &Path) -> Result<File, RelayError> {
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(io_error)
    }

    fn encode(entries: &[PersistedEntry]) -> Result<Vec<u8>, RelayError> {
        let mut bytes = Vec::new();
        for entry in entries {
            let record = bincode::serialize(entry)
                .map_err(|e| RelayError::Storage(format!("encode failed: {}", e)))?;
            bytes.extend_from_slice(&(record.len() as u32).to_le_bytes());
            bytes.extend_from_slice(&crc32fast::hash(&record).to_le_bytes());
            bytes.extend_from_slice(&record);
        }
        Ok(bytes)
    }

    /// Decode every intact record and report the length they occupy.
    fn scan(path: &Path) -> Result<(Vec<PersistedEntry>, u64), RelayError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(io_error(e)),
        };
        let file_len = file.metadata().map_err(io_error)?.len();

        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut valid_len = 0u64;
        while file_len - valid_len >= HEADER_LEN {
            let mut header = [0u8; HEADER_LEN as usize];
            reader.read_exact(&mut header).map_err(io_error)?;
            let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            let end = valid_len + HEADER_LEN + u64::from(len);
            if end > file_len {
                break;
            }
            let mut record = vec![0u8; len as usize];
            reader.read_exact(&mut record).map_err(io_error)?;
            if crc32fast::hash(&record) != crc {
                if end == file_len {
                    break;
                }
                return Err(RelayError::Storage(format!(
                    "checksum mismatch in record at offset {}",
                    valid_len
                )));
            }
            let entry: PersistedEntry = bincode::deserialize(&record).map_err(|e| {
                RelayError::Storage(format!("corrupt record at offset {}: {}", valid_len, e))
            })?;
            entries.push(entry);
            valid_len = end;
        }
        Ok((entries, valid_len))
    }
}

impl MailboxPersistence for FileBackedPersistence {
    fn load(&self) -> Result<Vec<PersistedEntry>, RelayError> {
        let _guard = self.file.lock();
        Ok(Self::scan(&self.path)?.0)
    }

    fn persist(&self, entries: &[PersistedEntry]) -> Result<(), RelayError> {
        let bytes = Self::encode(entries)?;

        let mut file = self.file.lock();
        let start = file.metadata().map_err(io_error)?.len();
        let written = (|| {
            file.seek(SeekFrom::End(0))?;
            file.write_all(&bytes)?;
            file.sync_data()
        })();
        if let Err(e) = written {
            // Drop any partial batch so the file stays a sequence of whole records.
            let _ = file.set_len(start);
            return Err(io_error(e));
        }
        Ok(())
    }

    fn rewrite(&self, entries: &[PersistedEntry]) -> Result<(), RelayError> {
        let bytes = Self::encode(entries)?;

        let mut file = self.file.lock();
        let tmp = self.path.with_extension("compact");
        {
            let mut out = File::create(&tmp).map_err(io_error)?;
            out.write_all(&bytes).map_err(io_error)?;
            out.sync_all().map_err(io_error)?;
        }
        std::fs::rename(&tmp, &self.path).map_err(io_error)?;
        *file = Self::open_file(&self.path)?;

        tracing::debug!(path = %self.path.display(), records = entries.len(), bytes = bytes.len(), "Rewrote mailbox record file");
        Ok(())
    }
}

fn io_error(e: std::io::Error) -> RelayError {
    RelayError::Storage(e.to_string())
}
