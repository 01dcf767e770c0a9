//! Deadline-bounded peer RPC.
//!
//! One request line out, one response line back, the whole exchange under a
//! per-call deadline. Unreachable peers surface as `Error::Rpc`, which
//! callers treat as a non-event: the leader counts the ack as missing, the
//! masterless pump just moves on.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use drift_core::{Error, Result};

use crate::protocol::{ReplicatedRecord, Request};

/// Vote response from a peer.
#[derive(Debug, Deserialize)]
pub struct VoteReply {
    #[serde(default)]
    pub vote_granted: bool,
}

/// Plain success/failure ack from a peer.
#[derive(Debug, Deserialize)]
pub struct AckReply {
    #[serde(default)]
    pub success: bool,
}

/// `get_all_entries` payload from a peer.
#[derive(Debug, Deserialize)]
pub struct EntriesReply {
    #[serde(default)]
    pub entries: Vec<ReplicatedRecord>,
}

/// Thin request/response client over the line protocol.
#[derive(Debug, Clone, Copy)]
pub struct RpcClient {
    deadline: Duration,
}

impl RpcClient {
    /// Client whose calls default to `deadline`.
    pub fn new(deadline: Duration) -> Self {
        RpcClient { deadline }
    }

    /// Send `request` to `addr` and decode the single-line response.
    pub async fn call<T: DeserializeOwned>(&self, addr: &str, request: &Request) -> Result<T> {
        self.call_deadline(addr, request, self.deadline).await
    }

    /// Like [`call`](Self::call) with an explicit deadline, used by the
    /// startup sync which tolerates slower peers than the write path does.
    pub async fn call_deadline<T: DeserializeOwned>(
        &self,
        addr: &str,
        request: &Request,
        deadline: Duration,
    ) -> Result<T> {
        match tokio::time::timeout(deadline, exchange(addr, request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(Error::Rpc {
                addr: addr.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::Rpc {
                addr: addr.to_string(),
                reason: "deadline exceeded".to_string(),
            }),
        }
    }
}

async fn exchange<T: DeserializeOwned>(addr: &str, request: &Request) -> Result<T> {
    let mut stream = TcpStream::connect(addr).await?;

    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    stream.write_all(line.as_bytes()).await?;

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    reader.read_line(&mut response).await?;
    if response.is_empty() {
        return Err(Error::InvalidOperation(
            "peer closed connection before responding".to_string(),
        ));
    }
    Ok(serde_json::from_str(&response)?)
}
