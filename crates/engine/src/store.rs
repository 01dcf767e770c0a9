//! The store: WAL + mapping + indexes behind one master mutex.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::info;

use drift_core::{LogEntry, Result};
use drift_durability::{
    load_json, recover, write_json_atomic, write_snapshot, Wal, INDEXES_FILE, SNAPSHOT_FILE,
    WAL_FILE,
};
use drift_index::{IndexManager, SavedIndexes};

struct StoreInner {
    map: HashMap<String, String>,
    wal: Wal,
    indexes: IndexManager,
}

/// One node's durable key-value state.
///
/// Every mutation acquires the master mutex, appends to the WAL (the fsync
/// happens inside the critical section), applies to the mapping, and updates
/// the indexes before releasing. The mutex is coarse on purpose: writes are
/// throttled by the fsync, not by the critical section. Point reads take the
/// lock only for the lookup.
pub struct Store {
    data_dir: PathBuf,
    chaos: bool,
    inner: Mutex<StoreInner>,
}

impl Store {
    /// Open the store in `data_dir`, recovering the mapping from the
    /// snapshot and log, then loading the saved indexes, or rebuilding
    /// them from the mapping when no usable index file exists.
    ///
    /// `chaos` makes `save_snapshot` randomly decline; tests only.
    pub fn open(data_dir: &Path, chaos: bool) -> Result<Store> {
        std::fs::create_dir_all(data_dir)?;

        let map = recover(data_dir)?;
        let wal = Wal::open(&data_dir.join(WAL_FILE))?;

        let indexes = match load_json::<SavedIndexes>(&data_dir.join(INDEXES_FILE)) {
            Some(saved) => IndexManager::restore(saved),
            None => {
                let mut indexes = IndexManager::new();
                if !map.is_empty() {
                    info!(keys = map.len(), "rebuilding indexes from mapping");
                    // Sorted so a rebuild assigns insertion order deterministically.
                    let mut keys: Vec<&String> = map.keys().collect();
                    keys.sort();
                    for key in keys {
                        indexes.index(key, &map[key]);
                    }
                }
                indexes
            }
        };

        Ok(Store {
            data_dir: data_dir.to_path_buf(),
            chaos,
            inner: Mutex::new(StoreInner { map, wal, indexes }),
        })
    }

    /// Directory this store owns.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    fn apply_locked(inner: &mut StoreInner, entry: &LogEntry) -> Result<()> {
        inner.wal.append(entry)?;
        entry.apply(&mut inner.map);
        match entry {
            LogEntry::Set { key, value } => inner.indexes.index(key, value),
            LogEntry::Delete { key } => inner.indexes.remove(key),
            LogEntry::BulkSet { items } => {
                for (key, value) in items {
                    inner.indexes.index(key, value);
                }
            }
        }
        Ok(())
    }

    /// Insert or overwrite one key.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let entry = LogEntry::Set {
            key: key.to_string(),
            value: value.to_string(),
        };
        Self::apply_locked(&mut self.inner.lock(), &entry)
    }

    /// Delete one key. Returns `false` without touching the log when the
    /// key is absent, so the WAL stays free of no-op records.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        if !inner.map.contains_key(key) {
            return Ok(false);
        }
        let entry = LogEntry::Delete {
            key: key.to_string(),
        };
        Self::apply_locked(&mut inner, &entry)?;
        Ok(true)
    }

    /// Apply an ordered batch as one atomic log entry.
    pub fn bulk_set(&self, items: Vec<(String, String)>) -> Result<()> {
        let entry = LogEntry::BulkSet { items };
        Self::apply_locked(&mut self.inner.lock(), &entry)
    }

    /// Apply an entry received from a peer through the full durable path:
    /// log append + fsync + mapping + indexes, exactly like a local write.
    pub fn apply_replicated(&self, entry: &LogEntry) -> Result<()> {
        Self::apply_locked(&mut self.inner.lock(), entry)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Point lookup.
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().map.get(key).cloned()
    }

    /// Number of keys in the mapping.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// True when the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().map.is_empty()
    }

    /// Clone of the full mapping.
    pub fn entries(&self) -> HashMap<String, String> {
        self.inner.lock().map.clone()
    }

    /// TF-IDF ranked full-text search.
    pub fn full_text_search(&self, query: &str, top_k: usize) -> Vec<(String, f64)> {
        self.inner.lock().indexes.full_text_search(query, top_k)
    }

    /// Exact-substring phrase search.
    pub fn phrase_search(&self, phrase: &str) -> Vec<String> {
        self.inner.lock().indexes.phrase_search(phrase)
    }

    /// Cosine-ranked semantic search.
    pub fn semantic_search(&self, query: &str, top_k: usize) -> Vec<(String, f64)> {
        self.inner.lock().indexes.semantic_search(query, top_k)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Write the mapping snapshot atomically; on success the WAL is
    /// truncated, since the snapshot now covers every record in it.
    ///
    /// Returns `Ok(false)` when the chaos flag declined the write (nothing
    /// changed on disk in that case).
    pub fn save_snapshot(&self) -> Result<bool> {
        let mut inner = self.inner.lock();
        let wrote = write_snapshot(
            &self.data_dir.join(SNAPSHOT_FILE),
            &inner.map,
            self.chaos,
        )?;
        if wrote {
            inner.wal.truncate()?;
        }
        Ok(wrote)
    }

    /// Persist the index state atomically to `indexes.json`.
    pub fn save_indexes(&self) -> Result<()> {
        let saved = self.inner.lock().indexes.snapshot();
        write_json_atomic(&self.data_dir.join(INDEXES_FILE), &saved)
    }

    /// Attempt both snapshots; called on graceful shutdown. Failures are
    /// logged, not propagated; shutdown proceeds regardless.
    pub fn persist_all(&self) {
        if let Err(e) = self.save_indexes() {
            tracing::warn!(error = %e, "index snapshot on shutdown failed");
        }
        match self.save_snapshot() {
            Ok(true) => {}
            Ok(false) => tracing::warn!("mapping snapshot on shutdown declined by chaos flag"),
            Err(e) => tracing::warn!(error = %e, "mapping snapshot on shutdown failed"),
        }
    }
}
