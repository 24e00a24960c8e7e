//! Storage backends for the ledger's newline-delimited JSON records.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StorageError;

/// Sync mode applied after each append.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// fsync (data only) after every append
    #[default]
    Immediate,
    /// No explicit sync, relies on the OS
    OsManaged,
}

/// What [`LedgerStorage::repair_tail`] did to the end of the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TailRepair {
    /// The store already ended on a record terminator
    Clean,
    /// A complete record lacked only its terminator, which was added
    Terminated,
    /// A torn fragment of this many bytes was removed
    Truncated(u64),
}

/// Storage backend for the ledger: file-backed or in-memory.
///
/// Records handed to [`append_record`](LedgerStorage::append_record) are
/// complete, newline-terminated lines. Implementations must make each append
/// all-or-nothing, and a record must not become visible to readers (gain its
/// terminator) before it is durable.
pub trait LedgerStorage: Send + Sync {
    fn append_record(&self, record: &[u8], sync: SyncMode) -> Result<(), StorageError>;

    /// Raw contents of the store. Must not wait on an in-progress append.
    fn read_all(&self) -> Result<Vec<u8>, StorageError>;

    /// Make the store end on a record terminator. Bytes after the last
    /// terminator are kept (and terminated) if `is_record` accepts them,
    /// dropped otherwise.
    fn repair_tail(&self, is_record: &dyn Fn(&[u8]) -> bool) -> Result<TailRepair, StorageError>;

    fn describe(&self) -> String;
}

/// Length of `data` up to and including its last newline.
fn complete_prefix_len(data: &[u8]) -> usize {
    data.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1)
}

/// Decide how to repair `data` without touching it.
fn plan_repair(data: &[u8], is_record: &dyn Fn(&[u8]) -> bool) -> TailRepair {
    let keep = complete_prefix_len(data);
    let tail = &data[keep..];
    if tail.is_empty() {
        TailRepair::Clean
    } else if is_record(tail) {
        TailRepair::Terminated
    } else {
        TailRepair::Truncated(tail.len() as u64)
    }
}

// ---- File-backed storage ----

pub struct FileStorage {
    path: PathBuf,
    /// `None` for a read-only view
    writer: Option<Mutex<File>>,
}

impl FileStorage {
    /// Open (creating if needed) the ledger file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: Some(Mutex::new(file)),
        })
    }

    /// A view that never creates, repairs or appends to the file. A missing
    /// file reads as empty.
    pub fn open_read_only(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
        }
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, File>, StorageError> {
        self.writer
            .as_ref()
            .ok_or(StorageError::ReadOnly)?
            .lock()
            .map_err(|_| StorageError::LockPoisoned)
    }
}

impl LedgerStorage for FileStorage {
    fn append_record(&self, record: &[u8], sync: SyncMode) -> Result<(), StorageError> {
        let mut file = self.writer()?;
        let before = file.metadata()?.len();
        let body = record.strip_suffix(b"\n").unwrap_or(record);

        // Readers ignore an unterminated line, so the record only becomes
        // visible once the terminator lands after the body is durable.
        let written = file
            .write_all(body)
            .and_then(|_| match sync {
                SyncMode::Immediate => file.sync_data(),
                SyncMode::OsManaged => file.flush(),
            })
            .and_then(|_| file.write_all(b"\n"));

        if let Err(e) = written {
            // Roll back a partial write so the next record starts on a clean line.
            if let Err(truncate_err) = file.set_len(before) {
                warn!(
                    path = %self.path.display(),
                    error = %truncate_err,
                    "Failed to roll back partial ledger write"
                );
            }
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<u8>, StorageError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn repair_tail(&self, is_record: &dyn Fn(&[u8]) -> bool) -> Result<TailRepair, StorageError> {
        if self.writer.is_none() {
            return Ok(TailRepair::Clean);
        }
        let mut file = self.writer()?;
        let mut data = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut data)?;

        let repair = plan_repair(&data, is_record);
        match repair {
            TailRepair::Clean => {}
            TailRepair::Terminated => {
                file.write_all(b"\n")?;
                file.sync_data()?;
            }
            TailRepair::Truncated(_) => {
                file.set_len(complete_prefix_len(&data) as u64)?;
                file.sync_data()?;
            }
        }
        Ok(repair)
    }

    fn describe(&self) -> String {
        match self.writer {
            Some(_) => format!("file:{}", self.path.display()),
            None => format!("file:{} (read-only)", self.path.display()),
        }
    }
}

// ---- In-memory storage ----

#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from pre-existing raw contents.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Mutex::new(bytes.into()),
        }
    }
}

impl LedgerStorage for MemoryStorage {
    fn append_record(&self, record: &[u8], _sync: SyncMode) -> Result<(), StorageError> {
        let mut data = self.data.lock().map_err(|_| StorageError::LockPoisoned)?;
        data.extend_from_slice(record);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<u8>, StorageError> {
        let data = self.data.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data.clone())
    }

    fn repair_tail(&self, is_record: &dyn Fn(&[u8]) -> bool) -> Result<TailRepair, StorageError> {
        let mut data = self.data.lock().map_err(|_| StorageError::LockPoisoned)?;
        let repair = plan_repair(&data, is_record);
        match repair {
            TailRepair::Clean => {}
            TailRepair::Terminated => data.push(b'\n'),
            TailRepair::Truncated(_) => {
                let keep = complete_prefix_len(&data);
                data.truncate(keep);
            }
        }
        Ok(repair)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
