//! Crash recovery: snapshot plus log replay.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::Path;

use tracing::{info, warn};

use drift_core::Result;

use crate::snapshot::load_json;
use crate::wal::Wal;
use crate::{SNAPSHOT_FILE, WAL_FILE};

/// Reconstruct the mapping from a node's data directory.
///
/// Loads the snapshot if one exists (a corrupt snapshot is ignored), then
/// replays the entire log over it in append order. The log may hold entries
/// both older and newer than the snapshot; re-applying the old ones is
/// harmless because set/delete/bulk_set are replay-safe and the tail of the
/// log always wins. Running recovery twice yields the same mapping.
///
/// A torn tail (crash mid-append) is discarded and physically truncated,
/// so records appended after the restart replay cleanly next time instead
/// of hiding behind unparseable bytes.
pub fn recover(data_dir: &Path) -> Result<HashMap<String, String>> {
    let snapshot_path = data_dir.join(SNAPSHOT_FILE);
    let wal_path = data_dir.join(WAL_FILE);

    let mut mapping: HashMap<String, String> = load_json(&snapshot_path).unwrap_or_default();
    let from_snapshot = mapping.len();

    let outcome = Wal::replay(&wal_path, |entry| entry.apply(&mut mapping))?;

    let file_len = match std::fs::metadata(&wal_path) {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    };
    if file_len > outcome.valid_len {
        warn!(
            path = %wal_path.display(),
            discarded = file_len - outcome.valid_len,
            "truncating torn log tail"
        );
        let file = OpenOptions::new().write(true).open(&wal_path)?;
        file.set_len(outcome.valid_len)?;
        file.sync_all()?;
    }

    info!(
        dir = %data_dir.display(),
        from_snapshot,
        replayed = outcome.applied,
        keys = mapping.len(),
        "recovery complete"
    );

    Ok(mapping)
}
