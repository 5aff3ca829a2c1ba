//! Maintenance Task
//!
//! Background task that purges expired keys from the in-process backend,
//! recounts the cache size and flushes statistics so gets between writes
//! are not lost.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backend::MemoryBackend;
use crate::cache::CacheStore;

/// Spawns a background task that runs one maintenance sweep per interval.
///
/// Each sweep removes expired keys from `backend`, recounts the live entries
/// of `cache` and then persists its counters. The returned handle is aborted during graceful
/// shutdown.
///
/// # Example
/// ```ignore
/// let backend = Arc::new(MemoryBackend::new());
/// let cache = Arc::new(CacheStore::open(backend.clone(), CacheConfig::default()).await);
/// let handle = spawn_maintenance_task(backend, cache.clone(), 60);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_maintenance_task(
    backend: Arc<MemoryBackend>,
    cache: Arc<CacheStore>,
    interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting maintenance task with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = backend.purge_expired().await;
            if removed > 0 {
                info!("Maintenance: purged {} expired keys", removed);
            } else {
                debug!("Maintenance: no expired keys found");
            }

            let size = cache.reconcile_size().await;
            debug!("Maintenance: {} live cache entries", size);
            cache.flush_stats().await;
        }
    })
}
