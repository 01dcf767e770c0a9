//! Wire protocol message types.
//!
//! Requests are JSON objects tagged by `command`; both the client and the
//! peer vocabulary decode into the one `Request` enum and the dispatcher
//! routes them to the node's handler. Responses serialize to the canonical
//! shapes: `{status, ...}` for clients, bare `{vote_granted}` / `{success}`
//! acks for peers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drift_core::{Error, LogEntry, NodeId, Term, VectorClock};

/// Result-set size used when a search request omits `top_k`.
pub const DEFAULT_TOP_K: usize = 10;

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// One key-value pair as clients spell it in `bulk_set` requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvPair {
    pub key: String,
    pub value: String,
}

/// Every request a node understands, client and peer vocabulary together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    // -- client vocabulary ------------------------------------------------
    Set {
        key: String,
        value: String,
    },
    Get {
        key: String,
    },
    Delete {
        key: String,
    },
    BulkSet {
        items: Vec<KvPair>,
    },
    FullTextSearch {
        query: String,
        #[serde(default = "default_top_k")]
        top_k: usize,
    },
    PhraseSearch {
        phrase: String,
    },
    SemanticSearch {
        query: String,
        #[serde(default = "default_top_k")]
        top_k: usize,
    },
    SaveIndexes,

    // -- peer vocabulary --------------------------------------------------
    RequestVote {
        term: Term,
        candidate_id: NodeId,
    },
    AppendEntries {
        term: Term,
        leader_id: NodeId,
    },
    /// Entry replication. The leader strategy stamps `term`; the masterless
    /// strategy stamps `vector_clock` and `source_node`. Each node validates
    /// the fields its strategy needs.
    Replicate {
        entry: LogEntry,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        term: Option<Term>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vector_clock: Option<VectorClock>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_node: Option<NodeId>,
    },
    GetAllEntries,
    GetClock,
    GetConflicts,
}

impl Request {
    /// Reject requests that violate the data model before they reach a
    /// handler. Keys are opaque but must be non-empty.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Request::Set { key, .. } | Request::Get { key } | Request::Delete { key } => {
                if key.is_empty() {
                    return Err("key must not be empty".to_string());
                }
            }
            Request::BulkSet { items } => {
                if items.iter().any(|pair| pair.key.is_empty()) {
                    return Err("bulk_set items must not contain empty keys".to_string());
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Response status tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
    Redirect,
}

/// One record of the masterless replication stream: an entry plus the
/// clock snapshot and origin under which it was accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedRecord {
    pub entry: LogEntry,
    pub vector_clock: VectorClock,
    pub source_node: NodeId,
}

impl ReplicatedRecord {
    /// The peer `replicate` request carrying this record.
    pub fn to_request(&self) -> Request {
        Request::Replicate {
            entry: self.entry.clone(),
            term: None,
            vector_clock: Some(self.vector_clock.clone()),
            source_node: Some(self.source_node),
        }
    }
}

/// One detected write conflict, kept for operator inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Wall-clock time of detection.
    pub time: DateTime<Utc>,
    /// Node that produced the conflicting write.
    pub source: NodeId,
    /// The conflicting entry.
    pub entry: LogEntry,
    /// This node's clock at detection time.
    pub my_clock: VectorClock,
    /// The incoming clock.
    pub their_clock: VectorClock,
    /// How the conflict was resolved.
    pub resolution: String,
}

/// Every response a node sends. Serialization is untagged: each variant is
/// already the exact JSON object the protocol promises.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Ack {
        status: Status,
        success: bool,
    },
    Value {
        status: Status,
        value: Option<String>,
    },
    Ranked {
        status: Status,
        results: Vec<(String, f64)>,
    },
    Keys {
        status: Status,
        results: Vec<String>,
    },
    Redirect {
        status: Status,
        leader_id: Option<NodeId>,
    },
    Error {
        status: Status,
        message: String,
    },
    Vote {
        vote_granted: bool,
    },
    PeerAck {
        success: bool,
    },
    Entries {
        status: Status,
        entries: Vec<ReplicatedRecord>,
    },
    Clock {
        status: Status,
        clock: VectorClock,
    },
    Conflicts {
        status: Status,
        conflicts: Vec<ConflictRecord>,
    },
}

impl Reply {
    pub fn ack(success: bool) -> Reply {
        Reply::Ack {
            status: Status::Ok,
            success,
        }
    }

    pub fn value(value: Option<String>) -> Reply {
        Reply::Value {
            status: Status::Ok,
            value,
        }
    }

    pub fn ranked(results: Vec<(String, f64)>) -> Reply {
        Reply::Ranked {
            status: Status::Ok,
            results,
        }
    }

    pub fn keys(results: Vec<String>) -> Reply {
        Reply::Keys {
            status: Status::Ok,
            results,
        }
    }

    pub fn redirect(leader_id: Option<NodeId>) -> Reply {
        Reply::Redirect {
            status: Status::Redirect,
            leader_id,
        }
    }

    pub fn error(message: impl Into<String>) -> Reply {
        Reply::Error {
            status: Status::Error,
            message: message.into(),
        }
    }

    pub fn vote(vote_granted: bool) -> Reply {
        Reply::Vote { vote_granted }
    }

    pub fn peer_ack(success: bool) -> Reply {
        Reply::PeerAck { success }
    }

    pub fn entries(entries: Vec<ReplicatedRecord>) -> Reply {
        Reply::Entries {
            status: Status::Ok,
            entries,
        }
    }

    pub fn clock(clock: VectorClock) -> Reply {
        Reply::Clock {
            status: Status::Ok,
            clock,
        }
    }

    pub fn conflicts(conflicts: Vec<ConflictRecord>) -> Reply {
        Reply::Conflicts {
            status: Status::Ok,
            conflicts,
        }
    }
}

impl From<Error> for Reply {
    fn from(e: Error) -> Reply {
        match e {
            Error::NotLeader { leader_id } => Reply::redirect(leader_id),
            other => Reply::error(other.to_string()),
        }
    }
}
