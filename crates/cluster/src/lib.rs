//! Cluster layer: wire protocol, dispatcher, and the two replication
//! strategies.
//!
//! The wire protocol is newline-terminated UTF-8 JSON in both directions
//! over plain TCP, pipelining allowed. Clients and peers share one framed
//! transport; the command vocabulary tells them apart, and each node role
//! refuses commands that are not legal for it.

pub mod leader;
pub mod masterless;
pub mod node;
pub mod protocol;
pub mod rpc;
pub mod server;

pub use leader::{LeaderNode, Role};
pub use masterless::MasterlessNode;
pub use node::{NodeKind, RunningNode};
pub use protocol::{ConflictRecord, KvPair, Reply, ReplicatedRecord, Request, Status};
pub use rpc::RpcClient;
pub use server::{serve, RequestHandler};
