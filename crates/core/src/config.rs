//! Node configuration.
//!
//! A `NodeConfig` describes one cluster member: its identity, where it
//! listens, where its data directory lives, which replication strategy it
//! runs, and the timing knobs of the replication layer. Loadable from a
//! JSON file; every field has a default so partial configs work.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::NodeId;

/// Which replication layer a node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationStrategy {
    /// Leader-driven: randomized-timeout election, quorum commit,
    /// redirect-on-follower.
    Leader,
    /// Masterless multi-writer: vector-clock stamping, async fan-out,
    /// last-writer-wins conflict resolution.
    Masterless,
}

/// One cluster member as seen in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Unique node id. Ties between concurrent masterless writes resolve
    /// toward the larger id, so ids must not repeat within a cluster.
    pub id: NodeId,
    /// `host:port` the node listens on.
    pub addr: String,
}

/// Full configuration for one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This node's id; must appear in `peers` for multi-node clusters.
    pub node_id: NodeId,
    /// Listen address, `host:port`.
    pub listen_addr: String,
    /// Directory owned exclusively by this node.
    pub data_dir: PathBuf,
    /// Replication strategy.
    pub strategy: ReplicationStrategy,
    /// All cluster members including this node. Empty means a standalone
    /// single-node deployment.
    pub peers: Vec<Peer>,

    /// Cadence of the background index snapshotter.
    pub index_snapshot_interval_ms: u64,
    /// Election timeout is drawn uniformly from this range for each
    /// election, which is what breaks split votes.
    pub election_timeout_min_ms: u64,
    /// Upper bound of the election-timeout range.
    pub election_timeout_max_ms: u64,
    /// Leader heartbeat cadence; also the election-loop tick.
    pub heartbeat_interval_ms: u64,
    /// Masterless fan-out pump cadence.
    pub fanout_interval_ms: u64,
    /// Deadline for `replicate` and vote RPCs.
    pub rpc_deadline_ms: u64,
    /// Deadline for the startup anti-entropy pull, per peer.
    pub sync_deadline_ms: u64,

    /// Makes `save_snapshot` decline with probability 0.5 without writing.
    /// Tests only; production configs never set this.
    pub chaos_snapshot_failures: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            node_id: 0,
            listen_addr: "127.0.0.1:7200".to_string(),
            data_dir: PathBuf::from("driftkv_data"),
            strategy: ReplicationStrategy::Masterless,
            peers: Vec::new(),
            index_snapshot_interval_ms: 30_000,
            election_timeout_min_ms: 1_500,
            election_timeout_max_ms: 3_000,
            heartbeat_interval_ms: 100,
            fanout_interval_ms: 10,
            rpc_deadline_ms: 200,
            sync_deadline_ms: 2_000,
            chaos_snapshot_failures: false,
        }
    }
}

impl NodeConfig {
    /// Load a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<NodeConfig> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Cluster size: number of configured peers, or one for a standalone
    /// node with an empty peer list.
    pub fn cluster_size(&self) -> usize {
        self.peers.len().max(1)
    }

    /// Strict majority of the cluster.
    pub fn majority(&self) -> usize {
        self.cluster_size() / 2 + 1
    }

    /// All members except this node.
    pub fn other_peers(&self) -> impl Iterator<Item = &Peer> {
        let node_id = self.node_id;
        self.peers.iter().filter(move |p| p.id != node_id)
    }

    /// Address of a peer by id.
    pub fn peer_addr(&self, id: NodeId) -> Option<&str> {
        self.peers
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.addr.as_str())
    }

    pub fn index_snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.index_snapshot_interval_ms)
    }

    /// Bounds of the per-election timeout draw.
    pub fn election_timeout_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.election_timeout_min_ms),
            Duration::from_millis(self.election_timeout_max_ms),
        )
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn fanout_interval(&self) -> Duration {
        Duration::from_millis(self.fanout_interval_ms)
    }

    pub fn rpc_deadline(&self) -> Duration {
        Duration::from_millis(self.rpc_deadline_ms)
    }

    pub fn sync_deadline(&self) -> Duration {
        Duration::from_millis(self.sync_deadline_ms)
    }
}
