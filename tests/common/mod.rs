//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's
//! main.rs.

#![allow(dead_code)]

use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use drift_cluster::RunningNode;
use drift_core::{NodeConfig, Peer, ReplicationStrategy};

pub const POLL: Duration = Duration::from_millis(25);

/// Send one request line to a node and return the parsed response line.
pub async fn send(addr: &str, body: Value) -> Value {
    let mut stream = TcpStream::connect(addr).await.expect("connect to node");
    let mut line = body.to_string();
    line.push('\n');
    stream.write_all(line.as_bytes()).await.expect("send request");

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    reader.read_line(&mut response).await.expect("read response");
    serde_json::from_str(&response).expect("parse response")
}

/// Convenience wrappers over the client vocabulary.
pub async fn set(addr: &str, key: &str, value: &str) -> Value {
    send(addr, json!({"command": "set", "key": key, "value": value})).await
}

pub async fn get(addr: &str, key: &str) -> Value {
    send(addr, json!({"command": "get", "key": key})).await
}

pub async fn delete(addr: &str, key: &str) -> Value {
    send(addr, json!({"command": "delete", "key": key})).await
}

/// A cluster under test: listeners are bound up-front on OS-assigned ports
/// so every node knows the full peer list before any node starts, and a
/// node can be started late (its listener just sits bound until then).
pub struct TestCluster {
    pub dirs: Vec<TempDir>,
    pub configs: Vec<NodeConfig>,
    listeners: Vec<Option<TcpListener>>,
    pub nodes: Vec<Option<RunningNode>>,
}

impl TestCluster {
    /// Bind `n` listeners and prepare configs with test-friendly timing:
    /// fast heartbeats and short election timeouts.
    pub async fn prepare(strategy: ReplicationStrategy, n: usize) -> TestCluster {
        let mut listeners = Vec::new();
        for _ in 0..n {
            listeners.push(Some(
                TcpListener::bind("127.0.0.1:0").await.expect("bind listener"),
            ));
        }
        let peers: Vec<Peer> = listeners
            .iter()
            .enumerate()
            .map(|(id, listener)| Peer {
                id: id as u64,
                addr: listener
                    .as_ref()
                    .unwrap()
                    .local_addr()
                    .unwrap()
                    .to_string(),
            })
            .collect();

        let dirs: Vec<TempDir> = (0..n).map(|_| tempfile::tempdir().unwrap()).collect();
        let configs: Vec<NodeConfig> = (0..n)
            .map(|id| NodeConfig {
                node_id: id as u64,
                listen_addr: peers[id].addr.clone(),
                data_dir: dirs[id].path().to_path_buf(),
                strategy,
                peers: peers.clone(),
                election_timeout_min_ms: 300,
                election_timeout_max_ms: 600,
                heartbeat_interval_ms: 50,
                ..NodeConfig::default()
            })
            .collect();

        let nodes = (0..n).map(|_| None).collect();
        TestCluster {
            dirs,
            configs,
            listeners,
            nodes,
        }
    }

    /// Start one node on its pre-bound listener.
    pub async fn start_node(&mut self, id: usize) {
        let listener = self.listeners[id].take().expect("listener already used");
        let node = RunningNode::start_on(self.configs[id].clone(), listener)
            .await
            .expect("start node");
        self.nodes[id] = Some(node);
    }

    /// Start every node.
    pub async fn start_all(&mut self) {
        for id in 0..self.nodes.len() {
            self.start_node(id).await;
        }
    }

    pub fn addr(&self, id: usize) -> String {
        self.configs[id].listen_addr.clone()
    }

    pub fn node(&self, id: usize) -> &RunningNode {
        self.nodes[id].as_ref().expect("node not running")
    }

    /// Hard-stop a node without persisting, like a crash.
    pub fn kill(&mut self, id: usize) {
        if let Some(node) = self.nodes[id].take() {
            node.kill();
        }
    }

    /// Indices of currently running nodes.
    pub fn running(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(id, _)| id)
            .collect()
    }

    /// Index of the node currently believing it is leader, if exactly one
    /// running node does.
    pub fn sole_leader(&self) -> Option<usize> {
        let leaders: Vec<usize> = self
            .running()
            .into_iter()
            .filter(|&id| {
                self.node(id)
                    .leader()
                    .map(|l| l.is_leader())
                    .unwrap_or(false)
            })
            .collect();
        if leaders.len() == 1 {
            Some(leaders[0])
        } else {
            None
        }
    }

    /// Poll until exactly one running node is leader; panics on timeout.
    pub async fn wait_for_sole_leader(&self, timeout: Duration) -> usize {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Some(id) = self.sole_leader() {
                return id;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "no sole leader emerged within {timeout:?}"
            );
            tokio::time::sleep(POLL).await;
        }
    }
}
