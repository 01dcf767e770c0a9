//! Background index snapshotter.
//!
//! Periodically persists the index state through the same atomic-rename
//! path the mapping snapshot uses. Runs independently of the mapping
//! snapshot; shutdown code calls `Store::persist_all` for the final saves.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::Store;

/// Spawn the periodic index-snapshot task.
///
/// The first save happens one full period after startup. The write holds
/// the master mutex only while cloning the index state, and runs on the
/// blocking pool because it ends in an fsync.
pub fn spawn_index_snapshotter(store: Arc<Store>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        loop {
            ticker.tick().await;
            let store = Arc::clone(&store);
            match tokio::task::spawn_blocking(move || store.save_indexes()).await {
                Ok(Ok(())) => debug!("periodic index snapshot written"),
                Ok(Err(e)) => warn!(error = %e, "periodic index snapshot failed"),
                Err(e) => warn!(error = %e, "index snapshot task failed to run"),
            }
        }
    })
}
