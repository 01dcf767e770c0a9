//! Write-ahead log entry types.
//!
//! Each entry is one state-changing operation. The serialized form (one
//! JSON object per line, tagged by `type`) is the on-disk WAL record format
//! and also the `entry` payload of peer `replicate` messages, so the field
//! names here are part of the external contract.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single durable mutation.
///
/// `BulkSet` is applied as one atomic unit: after recovery either all of its
/// pairs are visible or none are, because the whole entry lives on one WAL
/// line and a torn line is discarded during replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEntry {
    /// Insert or overwrite one key.
    Set {
        /// Key being written.
        key: String,
        /// Value being written.
        value: String,
    },

    /// Remove one key.
    Delete {
        /// Key being removed.
        key: String,
    },

    /// Insert or overwrite an ordered batch of keys atomically.
    BulkSet {
        /// Pairs applied in order as a single unit.
        items: Vec<(String, String)>,
    },
}

impl LogEntry {
    /// Entry tag as it appears on the wire and in the WAL.
    pub fn kind(&self) -> &'static str {
        match self {
            LogEntry::Set { .. } => "set",
            LogEntry::Delete { .. } => "delete",
            LogEntry::BulkSet { .. } => "bulk_set",
        }
    }

    /// Apply this entry to a mapping.
    ///
    /// Used both by crash recovery and by the live write path; the two must
    /// agree exactly for the mapping to be the replay of the log.
    pub fn apply(&self, map: &mut HashMap<String, String>) {
        match self {
            LogEntry::Set { key, value } => {
                map.insert(key.clone(), value.clone());
            }
            LogEntry::Delete { key } => {
                map.remove(key);
            }
            LogEntry::BulkSet { items } => {
                for (key, value) in items {
                    map.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Keys touched by this entry, in application order.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            LogEntry::Set { key, .. } | LogEntry::Delete { key } => vec![key.as_str()],
            LogEntry::BulkSet { items } => items.iter().map(|(k, _)| k.as_str()).collect(),
        }
    }
}
