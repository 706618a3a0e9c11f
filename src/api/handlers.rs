//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::cache::{
    CacheReport, CacheStore, CancellationFlag, CompactionResult, MaintenanceResult, RepairSummary,
};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    CleanRequest, CleanResponse, DeleteResponse, ExistsResponse, GetResponse, HealthResponse,
    MessageResponse, SetRequest, SetResponse, SnapshotRequest, SnapshotResponse, TtlRequest,
    TtlResponse,
};
use crate::offline::{OfflineManager, OfflineStatus};

/// Application state shared across all handlers.
///
/// The store synchronizes internally, so handlers share it through an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheStore>,
    pub offline: Arc<OfflineManager>,
}

impl AppState {
    /// Creates a new AppState around the given cache store.
    pub fn new(cache: CacheStore) -> Self {
        let cache = Arc::new(cache);
        Self {
            offline: Arc::new(OfflineManager::new(cache.clone())),
            cache,
        }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(CacheStore::new(config.cache.clone())?))
    }

    fn snapshot_path(&self, req: &SnapshotRequest) -> Result<PathBuf> {
        req.resolve(&self.cache.config().cache_dir)
    }
}

/// Runs file I/O and whole-cache passes off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CacheError::Internal(format!("blocking task failed: {}", e)))?
}

// == Entries ==
/// Handler for PUT /set
///
/// Stores a JSON value in the cache with optional TTL.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidArgument(error_msg));
    }

    let ttl = req.ttl();
    state.cache.set(req.key.clone(), req.value, ttl)?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state.cache.get(&key)?;
    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.cache.delete(&key)?;
    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for GET /exists/:key
pub async fn exists_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<ExistsResponse> {
    let exists = state.cache.exists(&key);
    Json(ExistsResponse { key, exists })
}

// == TTL ==
/// Handler for GET /ttl/:key
pub async fn get_ttl_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<TtlResponse>> {
    let remaining = state.cache.get_ttl(&key)?;
    Ok(Json(TtlResponse::new(key, remaining)))
}

/// Handler for PUT /ttl/:key
pub async fn set_ttl_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<TtlRequest>,
) -> Result<Json<TtlResponse>> {
    state.cache.set_ttl(&key, req.ttl())?;
    let remaining = state.cache.get_ttl(&key)?;
    Ok(Json(TtlResponse::new(key, remaining)))
}

/// Handler for POST /ttl/:key/refresh
pub async fn refresh_ttl_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<TtlResponse>> {
    state.cache.refresh_ttl(&key)?;
    let remaining = state.cache.get_ttl(&key)?;
    Ok(Json(TtlResponse::new(key, remaining)))
}

// == Reporting ==
/// Handler for GET /stats (`cache show`)
pub async fn stats_handler(State(state): State<AppState>) -> Json<CacheReport> {
    Json(state.cache.report())
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::from_report(state.cache.check_health()))
}

// == Maintenance ==
/// Handler for POST /cache/clean
///
/// Always sweeps expired entries, then runs each requested extra pass.
/// The whole request is checked before anything is removed.
pub async fn clean_handler(
    State(state): State<AppState>,
    Json(req): Json<CleanRequest>,
) -> Result<Json<CleanResponse>> {
    let passes = req.passes()?;
    let cache = &state.cache;
    let mut resp = CleanResponse {
        expired_removed: cache.clean_expired()?,
        ..CleanResponse::default()
    };
    if let Some(max_age) = passes.max_age {
        resp.age_removed = cache.cleanup_by_age(max_age)?;
    }
    if let Some(unused) = passes.unused {
        resp.unused_removed = cache.cleanup_unused(unused)?;
    }
    if let Some(target) = passes.target_size {
        resp.size_removed = cache.cleanup_by_size(target)?;
    }
    resp.total_removed =
        resp.expired_removed + resp.age_removed + resp.unused_removed + resp.size_removed;

    Ok(Json(resp))
}

/// Handler for POST /cache/compact
pub async fn compact_handler(State(state): State<AppState>) -> Result<Json<CompactionResult>> {
    Ok(Json(state.cache.compact()?))
}

/// Handler for POST /cache/repair
pub async fn repair_handler(State(state): State<AppState>) -> Result<Json<RepairSummary>> {
    let cache = state.cache.clone();
    let summary = blocking(move || cache.repair(&CancellationFlag::new())).await?;
    Ok(Json(summary))
}

/// Handler for POST /cache/maintenance
pub async fn maintenance_handler(
    State(state): State<AppState>,
) -> Result<Json<MaintenanceResult>> {
    let cache = state.cache.clone();
    let result = blocking(move || cache.perform_maintenance(&CancellationFlag::new())).await?;
    Ok(Json(result))
}

/// Handler for POST /cache/backup
pub async fn backup_handler(
    State(state): State<AppState>,
    Json(req): Json<SnapshotRequest>,
) -> Result<Json<SnapshotResponse>> {
    let path = state.snapshot_path(&req)?;
    let cache = state.cache.clone();
    let target = path.clone();
    blocking(move || cache.backup(&target)).await?;

    Ok(Json(SnapshotResponse {
        path: path.display().to_string(),
        entries: state.cache.len(),
    }))
}

/// Handler for POST /cache/restore
pub async fn restore_handler(
    State(state): State<AppState>,
    Json(req): Json<SnapshotRequest>,
) -> Result<Json<SnapshotResponse>> {
    let path = state.snapshot_path(&req)?;
    let cache = state.cache.clone();
    let source = path.clone();
    let entries = blocking(move || cache.restore(&source)).await?;

    Ok(Json(SnapshotResponse {
        path: path.display().to_string(),
        entries,
    }))
}

// == Offline ==
/// Handler for GET /offline
pub async fn offline_status_handler(State(state): State<AppState>) -> Json<OfflineStatus> {
    Json(state.offline.get_offline_status())
}

/// Handler for POST /offline/enable
pub async fn offline_enable_handler(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>> {
    state.offline.enable_offline_mode()?;
    Ok(Json(MessageResponse::new("Offline mode enabled")))
}

/// Handler for POST /offline/disable
pub async fn offline_disable_handler(
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>> {
    state.offline.disable_offline_mode()?;
    Ok(Json(MessageResponse::new("Offline mode disabled")))
}

/// Handler for POST /offline/sync
pub async fn offline_sync_handler(State(state): State<AppState>) -> Result<Json<MessageResponse>> {
    let offline = state.offline.clone();
    blocking(move || offline.sync_offline_data()).await?;
    Ok(Json(MessageResponse::new("Offline data synced")))
}
