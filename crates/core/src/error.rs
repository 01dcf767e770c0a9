//! Error types for driftkv.
//!
//! One `thiserror`-derived enum shared by every crate in the workspace,
//! plus the `Result<T>` alias used throughout.

use std::io;
use thiserror::Error;

use crate::NodeId;

/// Result type alias for driftkv operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the store, the indexes, and the cluster layer.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations, sockets).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Write-ahead log append could not reach stable storage.
    ///
    /// Fatal: the node must not acknowledge the write. Callers abort
    /// rather than continue with an unlogged mutation.
    #[error("WAL append failed: {0}")]
    WalAppend(#[source] io::Error),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation not valid for the current node state or arguments.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Quorum was not reached before the replication deadline.
    #[error("replication failed: {acks} of {needed} acknowledgments")]
    ReplicationFailed {
        /// Acknowledgments collected, including the leader's own.
        acks: usize,
        /// Strict majority of the cluster.
        needed: usize,
    },

    /// Client command arrived at a non-leader node (leader strategy).
    #[error("not the leader; known leader is {leader_id:?}")]
    NotLeader {
        /// Last leader this node heard from, if any.
        leader_id: Option<NodeId>,
    },

    /// A peer RPC failed or timed out.
    #[error("rpc to {addr} failed: {reason}")]
    Rpc {
        /// Peer address.
        addr: String,
        /// What went wrong.
        reason: String,
    },
}

impl Error {
    /// True when the node must abort instead of acknowledging.
    ///
    /// Only a failed WAL append qualifies: every other error leaves the
    /// durable state intact.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::WalAppend(_))
    }
}
