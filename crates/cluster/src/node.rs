//! Node runtime: wires the store, the request handler for the configured
//! strategy, the listener, and the background tasks together.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use drift_core::{Error, NodeConfig, ReplicationStrategy, Result};
use drift_engine::{spawn_index_snapshotter, Store};

use crate::leader::LeaderNode;
use crate::masterless::MasterlessNode;
use crate::server::{serve, RequestHandler};

/// Which strategy a running node is executing, with access to its state
/// for introspection.
pub enum NodeKind {
    Leader(Arc<LeaderNode>),
    Masterless(Arc<MasterlessNode>),
}

/// A live node: open store, listening socket, and background tasks.
pub struct RunningNode {
    store: Arc<Store>,
    kind: NodeKind,
    local_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningNode {
    /// Bind the configured listen address and start the node on it.
    pub async fn start(config: NodeConfig) -> Result<RunningNode> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        Self::start_on(config, listener).await
    }

    /// Start the node on an already-bound listener.
    ///
    /// Tests bind `127.0.0.1:0` themselves so the whole cluster's addresses
    /// are known before any node starts.
    pub async fn start_on(config: NodeConfig, listener: TcpListener) -> Result<RunningNode> {
        let local_addr = listener.local_addr()?;

        let data_dir = config.data_dir.clone();
        let chaos = config.chaos_snapshot_failures;
        let store = tokio::task::spawn_blocking(move || Store::open(&data_dir, chaos))
            .await
            .map_err(|e| Error::InvalidOperation(format!("store open task failed: {e}")))??;
        let store = Arc::new(store);

        let mut tasks = Vec::new();
        let handler: Arc<dyn RequestHandler>;
        let kind = match config.strategy {
            ReplicationStrategy::Leader => {
                let node = Arc::new(LeaderNode::new(config.clone(), Arc::clone(&store)));
                tasks.push(node.spawn_election_loop());
                handler = Arc::clone(&node) as Arc<dyn RequestHandler>;
                NodeKind::Leader(node)
            }
            ReplicationStrategy::Masterless => {
                let node = Arc::new(MasterlessNode::new(config.clone(), Arc::clone(&store)));
                tasks.push(node.spawn_fanout_pump());
                let syncer = Arc::clone(&node);
                tasks.push(tokio::spawn(async move {
                    syncer.sync_with_peers().await;
                }));
                handler = Arc::clone(&node) as Arc<dyn RequestHandler>;
                NodeKind::Masterless(node)
            }
        };

        tasks.push(tokio::spawn(async move {
            if let Err(e) = serve(listener, handler).await {
                error!(error = %e, "listener failed");
            }
        }));
        tasks.push(spawn_index_snapshotter(
            Arc::clone(&store),
            config.index_snapshot_interval(),
        ));

        info!(
            node = config.node_id,
            addr = %local_addr,
            strategy = ?config.strategy,
            "node started"
        );

        Ok(RunningNode {
            store,
            kind,
            local_addr,
            tasks,
        })
    }

    /// Address the node is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The node's store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Strategy-specific state.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Leader-strategy state, when running that strategy.
    pub fn leader(&self) -> Option<&Arc<LeaderNode>> {
        match &self.kind {
            NodeKind::Leader(node) => Some(node),
            NodeKind::Masterless(_) => None,
        }
    }

    /// Masterless state, when running that strategy.
    pub fn masterless(&self) -> Option<&Arc<MasterlessNode>> {
        match &self.kind {
            NodeKind::Masterless(node) => Some(node),
            NodeKind::Leader(_) => None,
        }
    }

    /// Graceful shutdown: stop serving, then attempt both final snapshots.
    pub async fn shutdown(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        let store = Arc::clone(&self.store);
        if let Err(e) = tokio::task::spawn_blocking(move || store.persist_all()).await {
            warn!(error = %e, "shutdown persistence task failed");
        }
    }

    /// Hard stop without persisting anything, the test stand-in for
    /// killing the process.
    pub fn kill(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for RunningNode {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
