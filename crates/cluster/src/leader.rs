//! Leader-driven replication: election, heartbeats, quorum writes.
//!
//! One node per term wins an election and serves all client traffic; the
//! rest redirect. A write is acknowledged once it is durable on a strict
//! majority of the cluster, counting the leader itself. Liveness comes from
//! the election timeout being re-drawn uniformly at random for every
//! election, so split votes resolve on the next term.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use drift_core::{Error, LogEntry, NodeConfig, NodeId, Result, Term};
use drift_engine::Store;

use crate::protocol::{KvPair, Reply, Request};
use crate::rpc::{AckReply, RpcClient, VoteReply};
use crate::server::{blocking, RequestHandler};

/// Election role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

struct ElectionState {
    role: Role,
    term: Term,
    voted_for: Option<NodeId>,
    leader_id: Option<NodeId>,
    last_heartbeat: Instant,
    election_timeout: Duration,
}

/// A node running the leader-replication strategy.
pub struct LeaderNode {
    config: NodeConfig,
    store: Arc<Store>,
    state: Mutex<ElectionState>,
    rpc: RpcClient,
}

fn draw_election_timeout(config: &NodeConfig) -> Duration {
    let (min, max) = config.election_timeout_range();
    rand::thread_rng().gen_range(min..=max)
}

enum Tick {
    Idle,
    Heartbeat,
    Election,
}

impl LeaderNode {
    /// Create the node in FOLLOWER state at term zero.
    pub fn new(config: NodeConfig, store: Arc<Store>) -> Self {
        let state = ElectionState {
            role: Role::Follower,
            term: 0,
            voted_for: None,
            leader_id: None,
            last_heartbeat: Instant::now(),
            election_timeout: draw_election_timeout(&config),
        };
        let rpc = RpcClient::new(config.rpc_deadline());
        LeaderNode {
            config,
            store,
            state: Mutex::new(state),
            rpc,
        }
    }

    /// Current role, for introspection and tests.
    pub fn role(&self) -> Role {
        self.state.lock().role
    }

    /// Current term.
    pub fn current_term(&self) -> Term {
        self.state.lock().term
    }

    /// Last leader this node heard from, if any.
    pub fn known_leader(&self) -> Option<NodeId> {
        self.state.lock().leader_id
    }

    /// True when this node currently believes it is the leader.
    pub fn is_leader(&self) -> bool {
        self.role() == Role::Leader
    }

    // ------------------------------------------------------------------
    // Election loop
    // ------------------------------------------------------------------

    /// Spawn the background task driving heartbeats and elections.
    ///
    /// Ticks at the heartbeat interval: a leader heartbeats, everyone else
    /// checks whether the election timeout has lapsed since the last
    /// heartbeat it observed.
    pub fn spawn_election_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(node.config.heartbeat_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let action = {
                    let state = node.state.lock();
                    if state.role == Role::Leader {
                        Tick::Heartbeat
                    } else if state.last_heartbeat.elapsed() >= state.election_timeout {
                        Tick::Election
                    } else {
                        Tick::Idle
                    }
                };
                match action {
                    Tick::Heartbeat => node.send_heartbeats().await,
                    Tick::Election => node.run_election().await,
                    Tick::Idle => {}
                }
            }
        })
    }

    async fn run_election(&self) {
        let term = {
            let mut state = self.state.lock();
            state.role = Role::Candidate;
            state.term += 1;
            state.voted_for = Some(self.config.node_id);
            state.leader_id = None;
            state.last_heartbeat = Instant::now();
            state.election_timeout = draw_election_timeout(&self.config);
            state.term
        };
        info!(
            node = self.config.node_id,
            term, "election timeout reached, standing as candidate"
        );

        let mut votes = 1usize;
        let mut calls = JoinSet::new();
        for peer in self.config.other_peers() {
            let rpc = self.rpc;
            let addr = peer.addr.clone();
            let request = Request::RequestVote {
                term,
                candidate_id: self.config.node_id,
            };
            calls.spawn(async move { rpc.call::<VoteReply>(&addr, &request).await });
        }
        while let Some(joined) = calls.join_next().await {
            if let Ok(Ok(reply)) = joined {
                if reply.vote_granted {
                    votes += 1;
                }
            }
        }

        let won = {
            let mut state = self.state.lock();
            // The vote round may have been overtaken by a higher term.
            if state.role == Role::Candidate
                && state.term == term
                && votes >= self.config.majority()
            {
                state.role = Role::Leader;
                state.leader_id = Some(self.config.node_id);
                true
            } else {
                false
            }
        };

        if won {
            info!(node = self.config.node_id, term, votes, "won election");
            self.send_heartbeats().await;
        }
    }

    async fn send_heartbeats(&self) {
        let term = {
            let state = self.state.lock();
            if state.role != Role::Leader {
                return;
            }
            state.term
        };

        let mut calls = JoinSet::new();
        for peer in self.config.other_peers() {
            let rpc = self.rpc;
            let addr = peer.addr.clone();
            let request = Request::AppendEntries {
                term,
                leader_id: self.config.node_id,
            };
            calls.spawn(async move {
                let _ = rpc.call::<AckReply>(&addr, &request).await;
            });
        }
        while calls.join_next().await.is_some() {}
    }

    // ------------------------------------------------------------------
    // Peer handlers
    // ------------------------------------------------------------------

    fn handle_request_vote(&self, term: Term, candidate_id: NodeId) -> Reply {
        let mut state = self.state.lock();
        if term > state.term {
            state.term = term;
            state.role = Role::Follower;
            state.voted_for = None;
        }

        let granted = term == state.term
            && (state.voted_for.is_none() || state.voted_for == Some(candidate_id));
        if granted {
            state.voted_for = Some(candidate_id);
            // Granting a vote defers our own candidacy.
            state.last_heartbeat = Instant::now();
        }
        Reply::vote(granted)
    }

    fn handle_append_entries(&self, term: Term, leader_id: NodeId) -> Reply {
        let mut state = self.state.lock();
        if term >= state.term {
            state.term = term;
            state.role = Role::Follower;
            state.leader_id = Some(leader_id);
            state.last_heartbeat = Instant::now();
            Reply::peer_ack(true)
        } else {
            Reply::peer_ack(false)
        }
    }

    async fn handle_replicate(&self, entry: LogEntry, term: Term) -> Reply {
        {
            let mut state = self.state.lock();
            if term < state.term {
                return Reply::peer_ack(false);
            }
            state.term = term;
            state.role = Role::Follower;
            state.last_heartbeat = Instant::now();
        }

        // The entry goes through the full durable path before the ack.
        let store = Arc::clone(&self.store);
        match blocking(move || store.apply_replicated(&entry)).await {
            Ok(()) => Reply::peer_ack(true),
            Err(e) => self.store_failure(e),
        }
    }

    // ------------------------------------------------------------------
    // Client write path
    // ------------------------------------------------------------------

    /// Apply locally, fan out to every peer in parallel, count acks
    /// (including self), and fail if the strict majority is not reached
    /// before the RPC deadline. The local entry stays applied either way;
    /// a failed quorum only means the client must not assume replication.
    async fn replicate_to_peers(&self, entry: LogEntry) -> Result<()> {
        let term = self.state.lock().term;
        let needed = self.config.majority();

        let mut acks = 1usize;
        let mut calls = JoinSet::new();
        for peer in self.config.other_peers() {
            let rpc = self.rpc;
            let addr = peer.addr.clone();
            let request = Request::Replicate {
                entry: entry.clone(),
                term: Some(term),
                vector_clock: None,
                source_node: None,
            };
            calls.spawn(async move { rpc.call::<AckReply>(&addr, &request).await });
        }
        while let Some(joined) = calls.join_next().await {
            if let Ok(Ok(reply)) = joined {
                if reply.success {
                    acks += 1;
                }
            }
        }

        if acks >= needed {
            Ok(())
        } else {
            warn!(
                node = self.config.node_id,
                acks, needed, "quorum not reached"
            );
            Err(Error::ReplicationFailed { acks, needed })
        }
    }

    async fn commit(&self, entry: LogEntry) -> Reply {
        let store = Arc::clone(&self.store);
        let local = entry.clone();
        if let Err(e) = blocking(move || store.apply_replicated(&local)).await {
            return self.store_failure(e);
        }
        match self.replicate_to_peers(entry).await {
            Ok(()) => Reply::ack(true),
            Err(e) => Reply::from(e),
        }
    }

    /// Client commands are only legal on the leader.
    fn ensure_leader(&self) -> Result<()> {
        let state = self.state.lock();
        if state.role != Role::Leader {
            return Err(Error::NotLeader {
                leader_id: state.leader_id,
            });
        }
        Ok(())
    }

    async fn handle_client(&self, request: Request) -> Reply {
        if let Err(e) = self.ensure_leader() {
            return Reply::from(e);
        }

        match request {
            Request::Set { key, value } => self.commit(LogEntry::Set { key, value }).await,
            Request::BulkSet { items } => {
                let items = items
                    .into_iter()
                    .map(|KvPair { key, value }| (key, value))
                    .collect();
                self.commit(LogEntry::BulkSet { items }).await
            }
            Request::Delete { key } => {
                let store = Arc::clone(&self.store);
                let target = key.clone();
                match blocking(move || store.delete(&target)).await {
                    Ok(false) => Reply::ack(false),
                    Ok(true) => match self.replicate_to_peers(LogEntry::Delete { key }).await {
                        Ok(()) => Reply::ack(true),
                        Err(e) => Reply::from(e),
                    },
                    Err(e) => self.store_failure(e),
                }
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
            other => Reply::error(format!(
                "command {:?} is not a client operation",
                other
            )),
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
}

#[async_trait]
impl RequestHandler for LeaderNode {
    async fn handle(&self, request: Request) -> Reply {
        match request {
            Request::RequestVote { term, candidate_id } => {
                self.handle_request_vote(term, candidate_id)
            }
            Request::AppendEntries { term, leader_id } => {
                self.handle_append_entries(term, leader_id)
            }
            Request::Replicate { entry, term, .. } => match term {
                Some(term) => self.handle_replicate(entry, term).await,
                None => Reply::error("replicate without a term on the leader strategy"),
            },
            Request::GetAllEntries | Request::GetClock | Request::GetConflicts => {
                Reply::error("not supported by the leader strategy")
            }
            client => self.handle_client(client).await,
        }
    }
}
