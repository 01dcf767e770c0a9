//! Shared types for driftkv.
//!
//! Everything the other crates agree on lives here: the unified error type,
//! the write-ahead log entry variants, vector clocks, and node configuration.

pub mod clock;
pub mod config;
pub mod entry;
pub mod error;

pub use clock::VectorClock;
pub use config::{NodeConfig, Peer, ReplicationStrategy};
pub use entry::LogEntry;
pub use error::{Error, Result};

/// Node identifier within a cluster.
///
/// Ids are small integers assigned in configuration. On the wire they appear
/// as JSON numbers except as vector-clock map keys, where JSON forces them
/// into strings; serde_json round-trips that encoding for us.
pub type NodeId = u64;

/// Election epoch counter for the leader-replication strategy.
pub type Term = u64;
