//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    backup_handler, clean_handler, compact_handler, delete_handler, exists_handler,
    get_handler, get_ttl_handler, health_handler, maintenance_handler, offline_disable_handler,
    offline_enable_handler, offline_status_handler, offline_sync_handler, refresh_ttl_handler,
    repair_handler, restore_handler, set_handler, set_ttl_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // entries
        .route("/set", put(set_handler))
        .route("/get/:key", get(get_handler))
        .route("/del/:key", delete(delete_handler))
        .route("/exists/:key", get(exists_handler))
        .route("/ttl/:key", get(get_ttl_handler).put(set_ttl_handler))
        .route("/ttl/:key/refresh", post(refresh_ttl_handler))
        // reporting
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        // maintenance
        .route("/cache/clean", post(clean_handler))
        .route("/cache/compact", post(compact_handler))
        .route("/cache/repair", post(repair_handler))
        .route("/cache/maintenance", post(maintenance_handler))
        .route("/cache/backup", post(backup_handler))
        .route("/cache/restore", post(restore_handler))
        // offline mode
        .route("/offline", get(offline_status_handler))
        .route("/offline/enable", post(offline_enable_handler))
        .route("/offline/disable", post(offline_disable_handler))
        .route("/offline/sync", post(offline_sync_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
