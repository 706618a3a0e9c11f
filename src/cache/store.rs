//! Cache Store Module
//!
//! Thread-safe cache engine: the entry map and metrics behind one lock,
//! TTL handling, pressure eviction on write, maintenance passes, snapshots
//! and listener dispatch.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::cancel::CancellationFlag;
use crate::cache::entry::{default_size_estimator, SizeEstimator};
use crate::cache::eviction::evict_until;
use crate::cache::maintenance::{
    self, CompactionResult, MaintenanceResult, ScheduledCleanupResult,
};
use crate::cache::metrics::PerformanceStats;
use crate::cache::persist::{self, CacheSnapshot, SNAPSHOT_FILE_NAME};
use crate::cache::state::{CacheEvent, CacheState, EvictionReason};
use crate::cache::validator::{self, HealthReport, RepairSummary};
use crate::cache::{CacheEntry, CacheMetrics, Ttl, MAX_KEY_LENGTH, MAX_VALUE_SIZE};
use crate::config::{CacheConfig, EvictionPolicy};
use crate::error::{CacheError, Result};

// == Cache Listener ==
/// Observer of cache activity.
///
/// Callbacks run synchronously on the calling thread after the store's lock
/// has been released, so a listener may call back into the store.
pub trait CacheListener: Send + Sync {
    fn on_cache_hit(&self, _key: &str) {}
    fn on_cache_miss(&self, _key: &str) {}
    fn on_cache_eviction(&self, _key: &str, _reason: EvictionReason) {}
}

// == Cache Report ==
/// The `cache show` view.
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub metrics: CacheMetrics,
    pub performance: PerformanceStats,
    pub eviction_policy: EvictionPolicy,
    pub default_ttl_secs: i64,
    pub cache_dir: PathBuf,
}

// == Cache Store ==
/// Main cache storage with TTL, eviction policies and self-repair.
pub struct CacheStore {
    /// Entries and metrics, always mutated together
    state: RwLock<CacheState>,
    /// Never held while `state` is locked
    config: RwLock<CacheConfig>,
    listeners: RwLock<Vec<Arc<dyn CacheListener>>>,
    /// Serializes snapshot writers so the newest snapshot lands last
    snapshot_lock: Mutex<()>,
    size_estimator: SizeEstimator,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.len())
            .field("config", &*self.config.read())
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store after validating `config`.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let metrics = CacheMetrics::new(config.max_size, config.max_entries as usize);
        info!(
            max_size = config.max_size,
            max_entries = config.max_entries,
            policy = %config.eviction_policy,
            "Cache store created"
        );

        Ok(Self {
            state: RwLock::new(CacheState::new(metrics)),
            config: RwLock::new(config),
            listeners: RwLock::new(Vec::new()),
            snapshot_lock: Mutex::new(()),
            size_estimator: default_size_estimator(),
        })
    }

    /// Replaces the size estimator used for new entries and repair.
    pub fn with_size_estimator(mut self, estimator: SizeEstimator) -> Self {
        self.size_estimator = estimator;
        self
    }

    /// Registers a listener for hit, miss and eviction callbacks.
    pub fn add_listener(&self, listener: Arc<dyn CacheListener>) {
        self.listeners.write().push(listener);
    }

    /// Runs `f` under the write lock, then dispatches the events it raised.
    fn mutate<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut CacheState) -> R,
    {
        let (result, events) = {
            let mut state = self.state.write();
            let result = f(&mut state);
            (result, state.take_events())
        };
        self.dispatch(events);
        result
    }

    fn dispatch(&self, events: Vec<CacheEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        for event in &events {
            for listener in &listeners {
                match event {
                    CacheEvent::Hit(key) => listener.on_cache_hit(key),
                    CacheEvent::Miss(key) => listener.on_cache_miss(key),
                    CacheEvent::Eviction(key, reason) => listener.on_cache_eviction(key, *reason),
                }
            }
        }
    }

    // == Set ==
    /// Stores a value under `key`.
    ///
    /// Overwrites keep the original creation time and access count. When a
    /// configured ceiling is exceeded afterwards, other entries are evicted
    /// in policy order down to `limit × (1 − eviction_ratio)`.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Ttl) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(CacheError::InvalidArgument("Key cannot be empty".to_string()));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidArgument(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }

        let size = (self.size_estimator)(&value).max(0);
        if size > MAX_VALUE_SIZE {
            return Err(CacheError::LimitExceeded(format!(
                "Value of {} bytes exceeds maximum size of {} bytes",
                size, MAX_VALUE_SIZE
            )));
        }

        let config = self.config();
        let now = Utc::now();
        let expires_at = ttl.expires_at(config.default_ttl_secs, now)?;

        let evicted = self.mutate(|state| {
            let mut entry = CacheEntry::new(key.clone(), value, size, expires_at, now);
            if let Some(previous) = state.entries.get(&key) {
                entry.created_at = previous.created_at;
                entry.access_count = previous.access_count.max(0);
                entry.compressed = previous.compressed;
                entry.metadata = previous.metadata.clone();
            }
            state.insert(entry);
            relieve_pressure(state, &config, &key)
        });

        if evicted > 0 {
            debug!(key = %key, evicted, "Evicted entries to stay within limits");
        }
        Ok(())
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired entries are removed on the spot and reported as `NotFound`.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.mutate(|state| {
            let now = Utc::now();
            let expired = state.entries.get(key).map(|entry| entry.is_expired_at(now));
            match expired {
                Some(false) => {
                    let value = state.entries.get_mut(key).map(|entry| {
                        entry.touch(now);
                        entry.value.clone()
                    });
                    state.record_hit(key);
                    value.ok_or_else(|| CacheError::NotFound(key.to_string()))
                }
                Some(true) => {
                    state.evict(key, EvictionReason::Expired);
                    state.record_miss(key);
                    Err(CacheError::NotFound(key.to_string()))
                }
                None => {
                    state.record_miss(key);
                    Err(CacheError::NotFound(key.to_string()))
                }
            }
        })
    }

    // == Delete ==
    /// Removes an entry by key. Deleting an absent key is not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.mutate(|state| {
            state.evict(key, EvictionReason::Manual);
        });
        Ok(())
    }

    // == Exists ==
    /// True if the key is present and not expired. Leaves access stats alone.
    pub fn exists(&self, key: &str) -> bool {
        let now = Utc::now();
        self.state
            .read()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    // == TTL ==
    /// Replaces the expiry of a live entry.
    pub fn set_ttl(&self, key: &str, ttl: Ttl) -> Result<()> {
        let default_ttl_secs = self.config.read().default_ttl_secs;
        let now = Utc::now();
        let expires_at = ttl.expires_at(default_ttl_secs, now)?;

        let mut state = self.state.write();
        match state.entries.get_mut(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                entry.expires_at = expires_at;
                entry.updated_at = now;
                Ok(())
            }
            _ => Err(CacheError::NotFound(key.to_string())),
        }
    }

    /// Remaining lifetime of a live entry, `None` when it never expires.
    pub fn get_ttl(&self, key: &str) -> Result<Option<std::time::Duration>> {
        let now = Utc::now();
        let state = self.state.read();
        match state.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => Ok(entry.ttl_remaining(now)),
            _ => Err(CacheError::NotFound(key.to_string())),
        }
    }

    /// Re-derives the expiry from the default TTL as of now.
    pub fn refresh_ttl(&self, key: &str) -> Result<()> {
        self.set_ttl(key, Ttl::Default)
    }

    // == Inspection ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.read().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Copy of one entry including expired ones, without touching it.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.state.read().entries.get(key).cloned()
    }

    /// Removes every entry as a manual delete. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let removed = self.mutate(|state| state.evict_where(EvictionReason::Manual, |_| true));
        info!(removed, "Cache cleared");
        removed
    }

    // == Metrics ==
    /// Returns a snapshot of the current metrics.
    pub fn metrics(&self) -> CacheMetrics {
        self.state.read().metrics.clone()
    }

    pub fn performance(&self) -> PerformanceStats {
        self.state.read().metrics.performance()
    }

    /// Zeroes activity counters, keeping gauges.
    pub fn reset_metrics(&self) {
        self.state.write().metrics.reset();
    }

    /// Metrics, derived numbers and the main settings in one view.
    pub fn report(&self) -> CacheReport {
        let config = self.config();
        let metrics = self.metrics();
        CacheReport {
            performance: metrics.performance(),
            metrics,
            eviction_policy: config.eviction_policy,
            default_ttl_secs: config.default_ttl_secs,
            cache_dir: config.cache_dir,
        }
    }

    // == Config ==
    pub fn config(&self) -> CacheConfig {
        self.config.read().clone()
    }

    /// Replaces the configuration after re-validating it.
    pub fn set_cache_config(&self, config: CacheConfig) -> Result<()> {
        config.validate()?;
        let (max_size, max_entries) = (config.max_size, config.max_entries as usize);
        *self.config.write() = config;
        self.state.write().metrics.set_limits(max_size, max_entries);
        info!(max_size, max_entries, "Cache configuration updated");
        Ok(())
    }

    // == Cleanup ==
    /// Removes all expired entries. Returns the number removed.
    pub fn clean_expired(&self) -> Result<usize> {
        let removed = self.mutate(maintenance::clean_expired_entries)?;
        if removed > 0 {
            info!(removed, "Removed expired entries");
        }
        Ok(removed)
    }

    pub fn cleanup_by_age(&self, max_age: Duration) -> Result<usize> {
        self.mutate(|state| maintenance::cleanup_by_age(state, max_age))
    }

    /// Evicts by the configured policy until at most `target_size` bytes remain.
    pub fn cleanup_by_size(&self, target_size: i64) -> Result<usize> {
        let policy = self.config.read().eviction_policy;
        self.mutate(|state| maintenance::cleanup_by_size(state, target_size, policy))
    }

    pub fn cleanup_unused(&self, threshold: Duration) -> Result<usize> {
        self.mutate(|state| maintenance::cleanup_unused_entries(state, threshold))
    }

    pub fn compact(&self) -> Result<CompactionResult> {
        let result = self.mutate(maintenance::compact_cache)?;
        info!(
            removed = result.removed,
            bytes_freed = result.bytes_freed,
            "Cache compacted"
        );
        Ok(result)
    }

    /// Rate-limited cleanup, see [`maintenance::scheduled_cleanup`].
    pub fn scheduled_cleanup(&self) -> Result<ScheduledCleanupResult> {
        let config = self.config();
        self.mutate(|state| maintenance::scheduled_cleanup(state, &config, Utc::now()))
    }

    /// Full maintenance pass.
    ///
    /// Works on a copy taken under the write lock and swaps it in only on
    /// completion; a cancelled pass leaves the live state untouched.
    pub fn perform_maintenance(&self, cancel: &CancellationFlag) -> Result<MaintenanceResult> {
        let (result, events) = {
            let mut state = self.state.write();
            let mut work = state.clone();
            let result = maintenance::perform_maintenance(&mut work, cancel)?;
            let events = work.take_events();
            *state = work;
            (result, events)
        };
        self.dispatch(events);
        Ok(result)
    }

    // == Validation ==
    /// Checks the cache directory is writable and validates every entry.
    ///
    /// Entries are copied out first so no I/O happens under the lock.
    pub fn validate(&self) -> Result<()> {
        let dir = self.config.read().cache_dir.clone();
        let entries = self.state.read().entries.clone();
        validator::validate_cache(&dir, &entries)
    }

    pub fn check_health(&self) -> HealthReport {
        let state = self.state.read();
        validator::check_cache_health(&state.entries, &state.metrics)
    }

    /// Replaces the state with a repaired copy.
    ///
    /// Dropped entries are reported to listeners as evictions.
    pub fn repair(&self, cancel: &CancellationFlag) -> Result<RepairSummary> {
        let (summary, events) = {
            let mut state = self.state.write();
            let outcome =
                validator::repair_cache(&state.entries, &state.metrics, &self.size_estimator, cancel)?;
            let summary = outcome.summary();
            let events: Vec<CacheEvent> = outcome
                .expired
                .iter()
                .map(|key| CacheEvent::Eviction(key.clone(), EvictionReason::Expired))
                .chain(
                    outcome
                        .unrepairable
                        .iter()
                        .map(|key| CacheEvent::Eviction(key.clone(), EvictionReason::Corrupted)),
                )
                .collect();
            *state = CacheState::from_parts(outcome.entries, outcome.metrics);
            (summary, events)
        };
        self.dispatch(events);
        Ok(summary)
    }

    // == Snapshots ==
    /// Writes a snapshot of the cache to `path`.
    ///
    /// The snapshot is cloned under a read lock; the file write runs unlocked.
    pub fn backup(&self, path: &Path) -> Result<()> {
        persist::check_path(path)?;
        let _writer = self.snapshot_lock.lock();
        let snapshot = {
            let state = self.state.read();
            CacheSnapshot::new(state.entries.clone(), state.metrics.clone())
        };
        persist::write_snapshot(path, &snapshot)?;
        self.state.write().metrics.last_backup = Some(snapshot.created_at);
        info!(path = %path.display(), entries = snapshot.entries.len(), "Cache backed up");
        Ok(())
    }

    /// Replaces the cache contents with the snapshot at `path`.
    ///
    /// Gauges are recomputed from the restored entries; limits come from the
    /// current configuration. Corrupt entries are kept for validation and
    /// repair to deal with.
    pub fn restore(&self, path: &Path) -> Result<usize> {
        let snapshot = persist::read_snapshot(path)?;
        let config = self.config();
        let restored = snapshot.entries.len();

        let mut metrics = snapshot.metrics;
        metrics.set_limits(config.max_size, config.max_entries as usize);
        {
            let mut state = self.state.write();
            metrics.started_at = state.metrics.started_at;
            *state = CacheState::from_parts(snapshot.entries, metrics);
        }
        info!(path = %path.display(), restored, "Cache restored");
        Ok(restored)
    }

    /// Path of the snapshot kept in the cache directory.
    pub fn snapshot_path(&self) -> PathBuf {
        self.config.read().cache_dir.join(SNAPSHOT_FILE_NAME)
    }

    /// Persists the cache into its directory.
    pub fn sync(&self) -> Result<()> {
        self.backup(&self.snapshot_path())
    }

    /// Loads the snapshot from the cache directory if one exists.
    ///
    /// Returns whether anything was loaded.
    pub fn load_persisted(&self) -> Result<bool> {
        let path = self.snapshot_path();
        if !path.exists() {
            debug!(path = %path.display(), "No persisted cache found");
            return Ok(false);
        }
        match self.restore(&path) {
            Ok(_) => Ok(true),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Could not load persisted cache");
                Err(err)
            }
        }
    }
}

/// Evicts other entries while a configured ceiling is exceeded.
fn relieve_pressure(state: &mut CacheState, config: &CacheConfig, written: &str) -> usize {
    let mut evicted = 0;

    if let Some(limit) = config.entry_limit() {
        if state.len() > limit {
            let target = config.relief_target(limit as i64).max(0) as usize;
            evicted += evict_until(
                state,
                config.eviction_policy,
                EvictionReason::Capacity,
                &[written],
                |s| s.len() <= target,
            );
        }
    }

    if let Some(limit) = config.size_limit() {
        if state.metrics.current_size > limit {
            let target = config.relief_target(limit);
            evicted += evict_until(
                state,
                config.eviction_policy,
                EvictionReason::Capacity,
                &[written],
                |s| s.metrics.current_size <= target,
            );
        }
    }

    evicted
}
