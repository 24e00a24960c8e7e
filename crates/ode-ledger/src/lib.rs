//! Ledger: the append-only, schema-validated event store for agent activity.
//!
//! Every observation, hypothesis, challenge or proposed action an agent
//! produces is recorded here as an immutable [`LedgerEntry`]. The ledger
//! provides:
//! - Validation before any durable write
//! - Strictly increasing, restart-safe entry ids
//! - All-or-nothing appends to a newline-delimited JSON store
//! - Full and incremental replay that tolerates torn or malformed records

pub mod clock;
pub mod entry;
pub mod error;
pub mod storage;
pub mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

pub use clock::IdClock;
pub use entry::{EntryDraft, EntryId, EntryType, LedgerEntry};
pub use error::{LedgerError, StorageError, ValidationError};
pub use storage::{FileStorage, LedgerStorage, MemoryStorage, SyncMode, TailRepair};
pub use validate::validate;

/// Configuration for a file-backed ledger.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Path of the JSONL file
    pub path: PathBuf,
    /// Sync behaviour after each append
    pub sync_mode: SyncMode,
}

impl LedgerConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sync_mode: SyncMode::Immediate,
        }
    }
}

/// A record that could not be replayed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkippedRecord {
    /// 1-based line number in the store
    pub line: usize,
    pub reason: String,
}

/// Result of a full scan of the store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Replay {
    pub entries: Vec<LedgerEntry>,
    pub skipped: Vec<SkippedRecord>,
}

impl Replay {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// The ledger. Cheap to share behind an `Arc`; appends are serialized
/// internally, reads never take the writer lock.
pub struct Ledger {
    storage: Arc<dyn LedgerStorage>,
    sync_mode: SyncMode,
    /// Guards id assignment and the durable write as one step.
    writer: Mutex<IdClock>,
    appended: watch::Sender<u64>,
}

impl Ledger {
    /// Open (or create) a file-backed ledger.
    pub fn open(config: LedgerConfig) -> Result<Self, StorageError> {
        let storage = FileStorage::open(&config.path)?;
        Self::with_storage(Arc::new(storage), config.sync_mode)
    }

    /// Open a file-backed ledger for reading only. Nothing on disk is
    /// created or repaired, and appends fail with [`StorageError::ReadOnly`].
    pub fn open_read_only(config: LedgerConfig) -> Result<Self, StorageError> {
        let storage = FileStorage::open_read_only(&config.path);
        Self::with_storage(Arc::new(storage), config.sync_mode)
    }

    /// A ledger that lives only in memory.
    pub fn in_memory() -> Self {
        Self::from_parts(Arc::new(MemoryStorage::new()), SyncMode::OsManaged, IdClock::new())
    }

    /// Open a ledger over any storage backend.
    ///
    /// Drops a torn trailing record left by a crash (a complete record that
    /// only lost its terminator is kept), then resumes the id clock from the
    /// greatest id already stored.
    pub fn with_storage(
        storage: Arc<dyn LedgerStorage>,
        sync_mode: SyncMode,
    ) -> Result<Self, StorageError> {
        let is_record = |tail: &[u8]| serde_json::from_slice::<LedgerEntry>(tail).is_ok();
        match storage.repair_tail(&is_record)? {
            TailRepair::Clean => {}
            TailRepair::Terminated => warn!(
                storage = %storage.describe(),
                "Terminated trailing ledger record"
            ),
            TailRepair::Truncated(bytes) => warn!(
                storage = %storage.describe(),
                bytes,
                "Truncated torn trailing ledger record"
            ),
        }

        let replay = scan(&storage.read_all()?);
        let last_id = replay.entries.iter().map(|e| e.id).max();

        info!(
            storage = %storage.describe(),
            entries = replay.entries.len(),
            skipped = replay.skipped.len(),
            "Ledger opened"
        );

        Ok(Self::from_parts(storage, sync_mode, IdClock::resume(last_id)))
    }

    fn from_parts(storage: Arc<dyn LedgerStorage>, sync_mode: SyncMode, clock: IdClock) -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            storage,
            sync_mode,
            writer: Mutex::new(clock),
            appended,
        }
    }

    /// Validate and durably append an entry.
    ///
    /// On success the returned entry is exactly what replay will yield.
    /// A validation failure leaves the store untouched; a storage failure
    /// leaves no partial record behind.
    pub async fn append(&self, draft: EntryDraft) -> Result<LedgerEntry, LedgerError> {
        let entry_type = validate(&draft)?;
        let payload = match draft.payload {
            serde_json::Value::Object(map) => map,
            _ => return Err(ValidationError::PayloadNotObject.into()),
        };

        let mut clock = self.writer.lock().await;
        let entry = LedgerEntry {
            id: clock.next(),
            timestamp: Utc::now(),
            agent_id: draft.agent_id,
            entry_type,
            payload,
            confidence: draft.confidence,
            references: draft.references,
        };

        let mut record = serde_json::to_vec(&entry).map_err(StorageError::from)?;
        record.push(b'\n');
        self.storage.append_record(&record, self.sync_mode)?;
        drop(clock);

        self.appended.send_modify(|n| *n += 1);
        debug!(id = %entry.id, entry_type = %entry.entry_type, agent_id = %entry.agent_id, "Entry appended");
        Ok(entry)
    }

    /// Every readable entry, in write order.
    pub async fn read_all(&self) -> Result<Vec<LedgerEntry>, StorageError> {
        Ok(self.replay().await?.entries)
    }

    /// Entries after the first `position` readable entries.
    pub async fn read_from(&self, position: usize) -> Result<Vec<LedgerEntry>, StorageError> {
        let mut entries = self.read_all().await?;
        if position >= entries.len() {
            return Ok(Vec::new());
        }
        Ok(entries.split_off(position))
    }

    /// Number of readable entries.
    pub async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.read_all().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len().await? == 0)
    }

    /// Full scan, reporting the records that were skipped.
    pub async fn replay(&self) -> Result<Replay, StorageError> {
        let raw = self.storage.read_all()?;
        let replay = scan(&raw);
        for skipped in &replay.skipped {
            warn!(line = skipped.line, reason = %skipped.reason, "Skipping malformed ledger record");
        }
        Ok(replay)
    }

    /// Counter bumped after every successful append made through this
    /// instance. Appends from other processes are only seen by polling.
    pub fn watch_appends(&self) -> watch::Receiver<u64> {
        self.appended.subscribe()
    }

    pub fn describe(&self) -> String {
        self.storage.describe()
    }
}

/// Parse raw store contents. A final line without a terminator is an
/// in-progress or torn write and is ignored silently.
fn scan(raw: &[u8]) -> Replay {
    let mut replay = Replay::default();
    let complete = match raw.iter().rposition(|b| *b == b'\n') {
        Some(i) => &raw[..=i],
        None => return replay,
    };

    for (idx, line) in complete.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<LedgerEntry>(line) {
            Ok(entry) => replay.entries.push(entry),
            Err(e) => replay.skipped.push(SkippedRecord {
                line: idx + 1,
                reason: e.to_string(),
            }),
        }
    }
    replay
}
