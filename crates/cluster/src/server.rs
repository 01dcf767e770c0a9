//! TCP server and per-connection request dispatcher.
//!
//! The accept loop spawns one task per connection. Each task reads
//! newline-delimited JSON records (buffering partial reads until the
//! terminator arrives), dispatches them to the node's handler, and writes
//! one response line per request in order, which is what makes pipelining
//! work without any further framing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::debug;

use drift_core::{Error, Result};

use crate::protocol::{Reply, Request};

/// The seam between the dispatcher and a node role.
///
/// Both replication strategies implement this; the server neither knows nor
/// cares which one it is driving.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Request) -> Reply;
}

/// Accept connections forever, spawning a dispatcher task per connection.
///
/// Connection tasks live in a `JoinSet`, so cancelling the serve task tears
/// them down with it.
pub async fn serve(listener: TcpListener, handler: Arc<dyn RequestHandler>) -> Result<()> {
    let mut connections = JoinSet::new();
    loop {
        let (stream, peer) = listener.accept().await?;
        // Reap finished connection tasks as we go.
        while connections.try_join_next().is_some() {}

        let handler = Arc::clone(&handler);
        connections.spawn(async move {
            if let Err(e) = handle_connection(stream, handler).await {
                debug!(peer = %peer, error = %e, "connection closed");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, handler: Arc<dyn RequestHandler>) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }

        let reply = dispatch_line(&line, handler.as_ref()).await;
        let mut out = serde_json::to_string(&reply)?;
        out.push('\n');
        write_half.write_all(out.as_bytes()).await?;
    }
}

/// Decode one record and route it.
///
/// A non-parseable line or an unknown command tag yields an error response;
/// the connection stays open either way.
pub(crate) async fn dispatch_line(line: &str, handler: &dyn RequestHandler) -> Reply {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return Reply::error(format!("malformed request: {e}")),
    };
    let tag = value
        .get("command")
        .and_then(|tag| tag.as_str())
        .map(str::to_string);

    match serde_json::from_value::<Request>(value) {
        Ok(request) => {
            if let Err(message) = request.validate() {
                return Reply::error(message);
            }
            handler.handle(request).await
        }
        Err(e) => match tag {
            Some(tag) => Reply::error(format!("unknown or invalid command: {tag}")),
            None => Reply::error(format!("malformed request: {e}")),
        },
    }
}

/// Run a store operation on the blocking pool.
///
/// Store mutations hold the master mutex across an fsync, which must not
/// happen on an executor thread.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(Error::InvalidOperation(format!(
            "store task did not complete: {e}"
        ))),
    }
}
