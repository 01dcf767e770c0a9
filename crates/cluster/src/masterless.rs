//! Masterless multi-writer replication.
//!
//! Every node accepts reads and writes directly. Each accepted write bumps
//! the node's own vector-clock component and is pushed to peers by a
//! background pump; incoming writes are checked against the local clock,
//! and concurrent updates resolve deterministically by source-node id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use drift_core::{Error, LogEntry, NodeConfig, Result, VectorClock};
use drift_engine::Store;

use crate::protocol::{ConflictRecord, KvPair, Reply, ReplicatedRecord, Request};
use crate::rpc::{EntriesReply, RpcClient};
use crate::server::{blocking, RequestHandler};

/// Clock state: the node's vector clock plus the last version applied from
/// each source, which is what dedupes re-delivered records.
struct ClockState {
    clock: VectorClock,
    applied: HashMap<drift_core::NodeId, u64>,
}

enum Decision {
    Duplicate,
    Apply,
    Conflict { apply: bool },
}

/// A node running the masterless strategy.
pub struct MasterlessNode {
    config: NodeConfig,
    store: Arc<Store>,
    clocks: Mutex<ClockState>,
    /// Local writes awaiting fan-out. Lock order is master → clock → queue;
    /// the queue lock is only ever taken last.
    queue: Mutex<Vec<ReplicatedRecord>>,
    /// Every record this node has accepted (local and remote), served to
    /// peers on `get_all_entries` for startup anti-entropy.
    history: Mutex<Vec<ReplicatedRecord>>,
    conflicts: Mutex<Vec<ConflictRecord>>,
    rpc: RpcClient,
}

impl MasterlessNode {
    pub fn new(config: NodeConfig, store: Arc<Store>) -> Self {
        let rpc = RpcClient::new(config.rpc_deadline());
        MasterlessNode {
            config,
            store,
            clocks: Mutex::new(ClockState {
                clock: VectorClock::new(),
                applied: HashMap::new(),
            }),
            queue: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            conflicts: Mutex::new(Vec::new()),
            rpc,
        }
    }

    /// Snapshot of this node's vector clock.
    pub fn clock(&self) -> VectorClock {
        self.clocks.lock().clock.clone()
    }

    /// Snapshot of the conflict log.
    pub fn conflict_log(&self) -> Vec<ConflictRecord> {
        self.conflicts.lock().clone()
    }

    // ------------------------------------------------------------------
    // Local writes
    // ------------------------------------------------------------------

    async fn apply_local(&self, entry: &LogEntry) -> Result<bool> {
        let store = Arc::clone(&self.store);
        let entry = entry.clone();
        blocking(move || match &entry {
            LogEntry::Delete { key } => store.delete(key),
            other => store.apply_replicated(other).map(|()| true),
        })
        .await
    }

    /// The per-write procedure: stamp, apply, enqueue, ack.
    ///
    /// The clock is incremented and snapshotted under the clock lock before
    /// the store is touched, so the stamp on the wire is exactly the clock
    /// under which the write was accepted.
    async fn local_write(&self, entry: LogEntry) -> Result<bool> {
        let stamped = {
            let mut clocks = self.clocks.lock();
            clocks.clock.increment(self.config.node_id);
            clocks.clock.clone()
        };

        let success = self.apply_local(&entry).await?;

        let record = ReplicatedRecord {
            entry,
            vector_clock: stamped,
            source_node: self.config.node_id,
        };
        self.history.lock().push(record.clone());
        self.queue.lock().push(record);
        Ok(success)
    }

    // ------------------------------------------------------------------
    // Incoming replication
    // ------------------------------------------------------------------

    /// Feed one record from a peer through dedupe, conflict detection, and
    /// clock merge. Also drives the startup sync, which replays peers'
    /// histories through this same path.
    pub(crate) async fn apply_incoming(&self, record: ReplicatedRecord) -> Result<()> {
        let source = record.source_node;
        let incoming_version = record.vector_clock.get(source);

        let (decision, clock_at_detection) = {
            let clocks = self.clocks.lock();
            let last_applied = clocks.applied.get(&source).copied().unwrap_or(0);
            let decision = if incoming_version <= last_applied {
                Decision::Duplicate
            } else if clocks.clock.concurrent_with(&record.vector_clock) {
                Decision::Conflict {
                    apply: source >= self.config.node_id,
                }
            } else {
                Decision::Apply
            };
            (decision, clocks.clock.clone())
        };

        let apply = match decision {
            Decision::Duplicate => return Ok(()),
            Decision::Apply => true,
            Decision::Conflict { apply } => {
                let resolution = if apply {
                    "applied incoming write (higher source id wins)"
                } else {
                    "kept local state (local id wins)"
                };
                warn!(
                    node = self.config.node_id,
                    source,
                    keys = ?record.entry.keys(),
                    resolution,
                    "concurrent write detected"
                );
                self.conflicts.lock().push(ConflictRecord {
                    time: Utc::now(),
                    source,
                    entry: record.entry.clone(),
                    my_clock: clock_at_detection,
                    their_clock: record.vector_clock.clone(),
                    resolution: resolution.to_string(),
                });
                apply
            }
        };

        if apply {
            let store = Arc::clone(&self.store);
            let entry = record.entry.clone();
            blocking(move || store.apply_replicated(&entry)).await?;
        }

        {
            let mut clocks = self.clocks.lock();
            clocks.clock.merge(&record.vector_clock);
            clocks.applied.insert(source, incoming_version);
        }
        self.history.lock().push(record);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Background fan-out
    // ------------------------------------------------------------------

    /// Spawn the pump that drains the replication queue on a short cadence
    /// and pushes each record to every peer. Delivery is fire-and-forget;
    /// unreachable peers catch up through startup sync.
    pub fn spawn_fanout_pump(self: &Arc<Self>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(node.config.fanout_interval());
            loop {
                ticker.tick().await;
                let batch = {
                    let mut queue = node.queue.lock();
                    if queue.is_empty() {
                        continue;
                    }
                    std::mem::take(&mut *queue)
                };

                for peer in node.config.other_peers() {
                    for record in &batch {
                        let request = record.to_request();
                        if let Err(e) = node
                            .rpc
                            .call::<serde_json::Value>(&peer.addr, &request)
                            .await
                        {
                            debug!(peer = %peer.addr, error = %e, "fan-out delivery skipped");
                        }
                    }
                }
            }
        })
    }

    /// Startup anti-entropy: pull every peer's history and replay it
    /// through the inbound path. Best-effort: unreachable peers are
    /// skipped, and dedupe makes re-delivery harmless.
    pub async fn sync_with_peers(&self) {
        for peer in self.config.other_peers() {
            match self
                .rpc
                .call_deadline::<EntriesReply>(
                    &peer.addr,
                    &Request::GetAllEntries,
                    self.config.sync_deadline(),
                )
                .await
            {
                Ok(reply) => {
                    let count = reply.entries.len();
                    for record in reply.entries {
                        if let Err(e) = self.apply_incoming(record).await {
                            warn!(peer = %peer.addr, error = %e, "startup sync entry failed");
                        }
                    }
                    info!(
                        node = self.config.node_id,
                        peer = %peer.addr,
                        records = count,
                        "startup sync complete"
                    );
                }
                Err(e) => {
                    debug!(peer = %peer.addr, error = %e, "startup sync skipped unreachable peer");
                }
            }
        }
    }

    fn store_failure(&self, e: Error) -> Reply {
        if e.is_fatal() {
            error!(
                node = self.config.node_id,
                error = %e,
                "durable log append failed, aborting node"
            );
            std::process::abort();
        }
        Reply::from(e)
    }

    async fn write_reply(&self, entry: LogEntry) -> Reply {
        match self.local_write(entry).await {
            Ok(success) => Reply::ack(success),
            Err(e) => self.store_failure(e),
        }
    }
}

#[async_trait]
impl RequestHandler for MasterlessNode {
    async fn handle(&self, request: Request) -> Reply {
        match request {
            Request::Set { key, value } => self.write_reply(LogEntry::Set { key, value }).await,
            Request::Delete { key } => self.write_reply(LogEntry::Delete { key }).await,
            Request::BulkSet { items } => {
                let items = items
                    .into_iter()
                    .map(|KvPair { key, value }| (key, value))
                    .collect();
                self.write_reply(LogEntry::BulkSet { items }).await
            }
            Request::Get { key } => Reply::value(self.store.get(&key)),
            Request::FullTextSearch { query, top_k } => {
                Reply::ranked(self.store.full_text_search(&query, top_k))
            }
            Request::PhraseSearch { phrase } => Reply::keys(self.store.phrase_search(&phrase)),
            Request::SemanticSearch { query, top_k } => {
                Reply::ranked(self.store.semantic_search(&query, top_k))
            }
            Request::SaveIndexes => {
                let store = Arc::clone(&self.store);
                match blocking(move || store.save_indexes()).await {
                    Ok(()) => Reply::ack(true),
                    Err(e) => self.store_failure(e),
                }
            }
            Request::Replicate {
                entry,
                vector_clock,
                source_node,
                ..
            } => match (vector_clock, source_node) {
                (Some(vector_clock), Some(source_node)) => {
                    let record = ReplicatedRecord {
                        entry,
                        vector_clock,
                        source_node,
                    };
                    match self.apply_incoming(record).await {
                        Ok(()) => Reply::peer_ack(true),
                        Err(e) => self.store_failure(e),
                    }
                }
                _ => Reply::error("replicate without a clock on the masterless strategy"),
            },
            Request::GetAllEntries => Reply::entries(self.history.lock().clone()),
            Request::GetClock => Reply::clock(self.clock()),
            Request::GetConflicts => Reply::conflicts(self.conflict_log()),
            Request::RequestVote { .. } | Request::AppendEntries { .. } => {
                Reply::error("not supported by the masterless strategy")
            }
        }
    }
}
