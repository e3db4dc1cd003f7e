use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use recall_core::model::{CardId, CardRecord, DiscoveredCard};
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::repository::{PersistedProgress, PersistedRecord, StorageError, to_persisted};

//
// ─── LOAD REPORT ───────────────────────────────────────────────────────────────
//

/// How the backing file looked when the store was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// The file parsed; see `LoadReport::skipped` for rejected entries.
    Loaded,
    /// No file yet; starting empty.
    Missing,
    /// The file could not be read or parsed; starting empty.
    Corrupt {
        reason: String,
        backup: Option<PathBuf>,
    },
}

/// Outcome of opening a store from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub status: LoadStatus,
    pub loaded: usize,
    pub skipped: usize,
}

impl LoadReport {
    /// True when progress that existed on disk was not recovered.
    #[must_use]
    pub fn lost_data(&self) -> bool {
        self.skipped > 0 || matches!(self.status, LoadStatus::Corrupt { .. })
    }
}

//
// ─── PROGRESS STORE ────────────────────────────────────────────────────────────
//

/// Durable mapping of card id → progress record.
///
/// The map sits behind a mutex held only for in-memory updates and for taking
/// the snapshot a save serialises. A second lock serialises writers of the
/// backing file.
#[derive(Debug, Default)]
pub struct ProgressStore {
    path: Option<PathBuf>,
    records: Mutex<BTreeMap<CardId, CardRecord>>,
    write_lock: Mutex<()>,
}

impl ProgressStore {
    /// A store with no backing file; `save` is a no-op.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the store at `path`, degrading to empty when the file is missing or corrupt.
    ///
    /// Never fails: unreadable data is logged and reported in the returned `LoadReport`.
    /// Corrupt bytes are copied to `<file>.corrupt` before the next save can overwrite them.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> (Self, LoadReport) {
        let path = path.into();
        let (records, report) = load(&path);
        let store = Self {
            path: Some(path),
            records: Mutex::new(records),
            write_lock: Mutex::new(()),
        };
        (store, report)
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Add cards not yet present; returns how many were new.
    ///
    /// Existing ids are never touched, even if their media now resolves differently.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Lock` if the map lock is poisoned.
    pub fn merge(
        &self,
        discovered: impl IntoIterator<Item = DiscoveredCard>,
    ) -> Result<usize, StorageError> {
        let mut records = self.lock_records()?;
        let mut added = 0;
        for card in discovered {
            if card.id.as_str().is_empty() {
                warn!("skipping discovered card with empty id");
                continue;
            }
            if records.contains_key(&card.id) {
                continue;
            }
            let record = card.to_new_record();
            records.insert(card.id, record);
            added += 1;
        }
        if added > 0 {
            info!(added, total = records.len(), "merged new cards into progress store");
        }
        Ok(added)
    }

    /// Fetch a copy of one card's record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Lock` if the map lock is poisoned.
    pub fn get(&self, id: &CardId) -> Result<Option<CardRecord>, StorageError> {
        Ok(self.lock_records()?.get(id).cloned())
    }

    /// Replace the record of an existing card with its graded version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the id is not in the store.
    pub fn record_review(&self, id: &CardId, record: CardRecord) -> Result<(), StorageError> {
        let mut records = self.lock_records()?;
        let slot = records
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.clone()))?;
        *slot = record;
        Ok(())
    }

    /// Copy of the full mapping.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Lock` if the map lock is poisoned.
    pub fn snapshot(&self) -> Result<BTreeMap<CardId, CardRecord>, StorageError> {
        Ok(self.lock_records()?.clone())
    }

    /// # Errors
    ///
    /// Returns `StorageError::Lock` if the map lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.lock_records()?.len())
    }

    /// # Errors
    ///
    /// Returns `StorageError::Lock` if the map lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.lock_records()?.is_empty())
    }

    /// Write the full mapping to the backing file atomically.
    ///
    /// Safe to call from another thread than the one mutating the map; only one
    /// save writes the file at a time.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` or `StorageError::Serialization` when the write
    /// fails. The in-memory map is unaffected and a later save may succeed.
    pub fn save(&self) -> Result<(), StorageError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let _writer = self
            .write_lock
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        let snapshot: PersistedProgress = {
            let records = self.lock_records()?;
            to_persisted(records.iter())
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        write_atomic(path, &bytes)?;
        debug!(path = %path.display(), cards = snapshot.len(), "saved progress");
        Ok(())
    }

    fn lock_records(&self) -> Result<MutexGuard<'_, BTreeMap<CardId, CardRecord>>, StorageError> {
        self.records
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }
}

//
// ─── LOADING ───────────────────────────────────────────────────────────────────
//

fn load(path: &Path) -> (BTreeMap<CardId, CardRecord>, LoadReport) {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no progress file yet, starting empty");
            return (BTreeMap::new(), report(LoadStatus::Missing, 0, 0));
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "progress file unreadable, starting empty");
            let status = LoadStatus::Corrupt {
                reason: err.to_string(),
                backup: None,
            };
            return (BTreeMap::new(), report(status, 0, 0));
        }
    };

    let persisted: BTreeMap<String, serde_json::Value> = match serde_json::from_slice(&contents) {
        Ok(persisted) => persisted,
        Err(err) => {
            let backup = preserve_corrupt(path, &contents);
            warn!(
                path = %path.display(),
                error = %err,
                backup = ?backup,
                "progress file is corrupt, starting empty"
            );
            let status = LoadStatus::Corrupt {
                reason: err.to_string(),
                backup,
            };
            return (BTreeMap::new(), report(status, 0, 0));
        }
    };

    let mut records = BTreeMap::new();
    let mut skipped = 0;
    for (id, entry) in persisted {
        // Keys are kept verbatim so a later merge finds the same id.
        if id.is_empty() {
            warn!("skipping progress entry with empty id");
            skipped += 1;
            continue;
        }
        let card_id = CardId::new(id);
        match PersistedRecord::parse_entry(entry) {
            Ok(record) => {
                records.insert(card_id, record);
            }
            Err(err) => {
                warn!(card_id = %card_id, error = %err, "skipping invalid progress entry");
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        preserve_corrupt(path, &contents);
    }

    let loaded = records.len();
    info!(path = %path.display(), loaded, skipped, "loaded progress");
    (records, report(LoadStatus::Loaded, loaded, skipped))
}

fn report(status: LoadStatus, loaded: usize, skipped: usize) -> LoadReport {
    LoadReport {
        status,
        loaded,
        skipped,
    }
}

fn preserve_corrupt(path: &Path, contents: &[u8]) -> Option<PathBuf> {
    let mut name = path.file_name()?.to_os_string();
    name.push(".corrupt");
    let backup = path.with_file_name(name);
    match fs::write(&backup, contents) {
        Ok(()) => Some(backup),
        Err(err) => {
            warn!(path = %backup.display(), error = %err, "could not preserve corrupt progress file");
            None
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
