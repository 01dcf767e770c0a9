//! driftkv: a replicated, durable key-value store with full-text, phrase,
//! and semantic search.
//!
//! This facade re-exports the public surface of the workspace crates:
//!
//! - [`drift_core`]: shared types (entries, clocks, config, errors)
//! - [`drift_durability`]: WAL, snapshots, recovery
//! - [`drift_index`]: the three search indexes
//! - [`drift_engine`]: the per-node store aggregate
//! - [`drift_cluster`]: wire protocol, dispatcher, replication strategies

pub use drift_cluster::{
    serve, ConflictRecord, KvPair, LeaderNode, MasterlessNode, NodeKind, Reply,
    ReplicatedRecord, Request, RequestHandler, Role, RpcClient, RunningNode, Status,
};
pub use drift_core::{
    Error, LogEntry, NodeConfig, NodeId, Peer, ReplicationStrategy, Result, Term, VectorClock,
};
pub use drift_engine::{spawn_index_snapshotter, Store};
pub use drift_index::{embed, tokenize, IndexManager, SavedIndexes, EMBED_DIM};
