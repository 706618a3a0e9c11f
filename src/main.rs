//! Offline Cache server binary.

use std::net::SocketAddr;

use anyhow::Context;
use offline_cache::api::create_router;
use offline_cache::{spawn_cleanup_task, AppState, Config};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the offline cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache store and load any persisted snapshot
/// 4. Start the scheduled cleanup task
/// 5. Serve the HTTP API until SIGINT/SIGTERM
/// 6. Persist the cache on the way out
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offline_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Offline Cache Server");

    let config = Config::from_env().context("invalid cache configuration")?;
    info!(
        port = config.server_port,
        max_entries = config.cache.max_entries,
        max_size = config.cache.max_size,
        default_ttl_secs = config.cache.default_ttl_secs,
        sync_interval_secs = config.cache.sync_interval_secs,
        cache_dir = %config.cache.cache_dir.display(),
        "Configuration loaded"
    );

    let state = AppState::from_config(&config).context("failed to create cache store")?;
    match state.cache.load_persisted() {
        Ok(true) => info!(entries = state.cache.len(), "Persisted cache loaded"),
        Ok(false) => info!("Starting with an empty cache"),
        Err(err) => warn!(error = %err, "Ignoring unreadable persisted cache"),
    }

    let cleanup_handle = spawn_cleanup_task(state.cache.clone(), config.cache.sync_interval_secs);

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("server error")?;

    if let Err(err) = state.cache.sync() {
        warn!(error = %err, "Failed to persist cache on shutdown");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the cleanup task.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
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

    cleanup_handle.abort();
    warn!("Cleanup task aborted");
}
