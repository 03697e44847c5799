//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache items.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::store::CacheStore;

/// Spawns a background task that periodically sweeps expired cache items.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between cleanup runs. It acquires a write lock on the cache store to
/// remove expired items across all backends.
///
/// # Arguments
/// * `store` - Shared reference to the cache store
/// * `cleanup_interval_secs` - Interval in seconds between cleanup runs
///
/// # Returns
/// A JoinHandle for the spawned task, which the owning cache aborts on
/// `destroy`.
pub fn spawn_cleanup_task(
    store: Arc<RwLock<CacheStore>>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs);

    tokio::spawn(async move {
        info!(
            interval_secs = cleanup_interval_secs,
            "Starting TTL cleanup task"
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            // Acquire write lock and sweep expired items
            let removed = {
                let mut store_guard = store.write().await;
                store_guard.cleanup(false)
            };

            // Log cleanup statistics
            if removed > 0 {
                info!(removed, "TTL cleanup removed expired items");
            } else {
                debug!("TTL cleanup found no expired items");
            }
        }
    })
}
