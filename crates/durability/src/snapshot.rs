//! Atomic snapshot writing and loading.
//!
//! Write-to-temp then rename: the canonical file either holds the previous
//! complete snapshot or the new complete snapshot, never a partial one.
//! The same helper persists the mapping snapshot and the serialized index
//! state; the temp sibling uses the `.tmp` extension (`snapshot.tmp`,
//! `indexes.tmp`).

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use drift_core::Result;

/// Serialize `value` as JSON to `path` via temp-file-plus-rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    // A stale temp file is debris from a previous failed attempt.
    if temp_path.exists() {
        warn!(path = %temp_path.display(), "removing stale temp file");
        let _ = std::fs::remove_file(&temp_path);
    }

    let result = (|| -> Result<()> {
        let mut file = File::create(&temp_path)?;
        serde_json::to_writer(&mut file, value)?;
        file.sync_all()?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    })();

    if let Err(e) = &result {
        warn!(
            path = %temp_path.display(),
            error = %e,
            "snapshot write failed, cleaning up temp file"
        );
        let _ = std::fs::remove_file(&temp_path);
    } else {
        debug!(path = %path.display(), "atomic write completed");
    }

    result
}

/// Load a JSON document from `path`.
///
/// Returns `None` when the file is missing or does not parse; a corrupt
/// file is logged and otherwise treated exactly like a missing one, so
/// recovery falls through to the log.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "snapshot unreadable, ignoring");
            return None;
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt snapshot, ignoring");
            None
        }
    }
}

/// Write the mapping snapshot.
///
/// With `chaos` set this declines with probability 0.5 and writes nothing,
/// returning `Ok(false)`; that path exists for crash-injection tests only.
/// Returns `Ok(true)` when the snapshot really landed.
pub fn write_snapshot(
    path: &Path,
    mapping: &HashMap<String, String>,
    chaos: bool,
) -> Result<bool> {
    if chaos && rand::random::<f64>() < 0.5 {
        debug!(path = %path.display(), "chaos flag declined snapshot");
        return Ok(false);
    }
    write_json_atomic(path, mapping)?;
    Ok(true)
}
