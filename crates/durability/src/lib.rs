//! Durability layer: write-ahead log, snapshots, recovery.
//!
//! The WAL is the source of truth. Every mutation is appended as one
//! newline-terminated JSON record and forced to stable storage before the
//! write is acknowledged. Snapshots compact the log: the full mapping is
//! written to a temp file and atomically renamed over the canonical path,
//! so a partial snapshot never becomes visible. Recovery loads the newest
//! snapshot (if any) and replays the log over it in append order.

pub mod recovery;
pub mod snapshot;
pub mod wal;

pub use recovery::recover;
pub use snapshot::{load_json, write_json_atomic, write_snapshot};
pub use wal::Wal;

/// Append-only log file name inside a node's data directory.
pub const WAL_FILE: &str = "wal.log";
/// Canonical mapping snapshot file name.
pub const SNAPSHOT_FILE: &str = "snapshot.json";
/// Canonical serialized-index file name.
pub const INDEXES_FILE: &str = "indexes.json";
