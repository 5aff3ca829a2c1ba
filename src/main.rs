//! Query Cache - operator server
//!
//! Runs a cache namespace on the in-process backend and exposes the
//! operator endpoints for health, statistics and tag invalidation.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use query_cache::{
    create_router, spawn_maintenance_task, AppState, CacheStore, Config, MemoryBackend,
};

/// Main entry point for the query cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the cache store, restoring persisted statistics
/// 4. Start the background maintenance task
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM, flushing statistics
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "query_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Query Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_size={}, default_ttl={}s, prefix={}, port={}, cleanup_interval={}s",
        config.cache.max_size,
        config.cache.default_ttl,
        config.cache.key_prefix,
        config.server_port,
        config.cleanup_interval
    );

    let backend = Arc::new(MemoryBackend::new());
    let cache = Arc::new(CacheStore::open(backend.clone(), config.cache.clone()).await);
    info!("Cache store initialized");

    let maintenance_handle =
        spawn_maintenance_task(backend, cache.clone(), config.cleanup_interval);
    info!("Background maintenance task started");

    // No data engine runs in this process, so /query-stats stays unmounted
    let app = create_router(AppState::new(cache.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(maintenance_handle))
        .await
        .context("server error")?;

    cache.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the maintenance task and allows graceful shutdown.
async fn shutdown_signal(maintenance_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    maintenance_handle.abort();
    warn!("Maintenance task aborted");
}
