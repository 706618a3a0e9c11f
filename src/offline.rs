//! Offline Mode Module
//!
//! A two-state switch over the cache store. Offline mode may only be entered
//! once every essential key is cached; the offline read paths refuse to serve
//! while online.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::{CacheStore, Ttl};
use crate::error::{CacheError, Result};

/// Keys that must be cached before offline mode can be enabled
pub const ESSENTIAL_KEYS: [&str; 4] = [
    "templates:list",
    "templates:metadata",
    "versions:latest",
    "config:defaults",
];

/// Prefix for per-template metadata keys
const TEMPLATE_METADATA_PREFIX: &str = "templates:metadata:";

// == Offline Mode ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OfflineMode {
    #[default]
    Online,
    Offline,
}

impl fmt::Display for OfflineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfflineMode::Online => f.write_str("online"),
            OfflineMode::Offline => f.write_str("offline"),
        }
    }
}

// == Offline Status ==
/// Readiness report for offline operation.
#[derive(Debug, Clone, Serialize)]
pub struct OfflineStatus {
    pub mode: OfflineMode,
    pub cache_size: i64,
    pub cache_entries: usize,
    /// Availability of each essential key
    pub essential_data: BTreeMap<String, bool>,
    /// Available essential keys as a percentage, 0 to 100
    pub readiness_score: f64,
}

// == Offline Manager ==
#[derive(Debug)]
pub struct OfflineManager {
    store: Arc<CacheStore>,
    mode: RwLock<OfflineMode>,
}

impl OfflineManager {
    /// Creates a manager in online mode.
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            mode: RwLock::new(OfflineMode::Online),
        }
    }

    pub fn mode(&self) -> OfflineMode {
        *self.mode.read()
    }

    pub fn is_offline(&self) -> bool {
        self.mode() == OfflineMode::Offline
    }

    /// Essential keys that are not currently live in the store.
    fn missing_essential_keys(&self) -> Vec<&'static str> {
        ESSENTIAL_KEYS
            .iter()
            .copied()
            .filter(|key| !self.store.exists(key))
            .collect()
    }

    /// Fails with `InvalidState` naming every missing essential key.
    pub fn validate_offline_data(&self) -> Result<()> {
        let missing = self.missing_essential_keys();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CacheError::InvalidState(format!(
                "missing essential offline data: {}",
                missing.join(", ")
            )))
        }
    }

    /// Switches to offline mode once the essential data is present.
    ///
    /// The mode lock is held across the check so a concurrent transition
    /// cannot interleave with it.
    pub fn enable_offline_mode(&self) -> Result<()> {
        let mut mode = self.mode.write();
        if let Err(err) = self.validate_offline_data() {
            warn!(error = %err, "Refusing to enable offline mode");
            return Err(err);
        }
        *mode = OfflineMode::Offline;
        info!("Offline mode enabled");
        Ok(())
    }

    pub fn disable_offline_mode(&self) -> Result<()> {
        *self.mode.write() = OfflineMode::Online;
        info!("Offline mode disabled");
        Ok(())
    }

    pub fn get_offline_status(&self) -> OfflineStatus {
        let metrics = self.store.metrics();
        let essential_data: BTreeMap<String, bool> = ESSENTIAL_KEYS
            .iter()
            .map(|key| (key.to_string(), self.store.exists(key)))
            .collect();
        let available = essential_data.values().filter(|present| **present).count();

        OfflineStatus {
            mode: self.mode(),
            cache_size: metrics.current_size,
            cache_entries: metrics.current_entries,
            essential_data,
            readiness_score: available as f64 / ESSENTIAL_KEYS.len() as f64 * 100.0,
        }
    }

    // == Offline Read Paths ==
    fn offline_get(&self, key: &str) -> Result<Value> {
        if !self.is_offline() {
            return Err(CacheError::NotOffline(key.to_string()));
        }
        self.store.get(key)
    }

    pub fn get_cached_templates(&self) -> Result<Value> {
        self.offline_get("templates:list")
    }

    pub fn get_cached_template_metadata(&self, name: &str) -> Result<Value> {
        self.offline_get(&format!("{}{}", TEMPLATE_METADATA_PREFIX, name))
    }

    pub fn get_cached_versions(&self) -> Result<Value> {
        self.offline_get("versions:latest")
    }

    pub fn get_cached_config_defaults(&self) -> Result<Value> {
        self.offline_get("config:defaults")
    }

    // == Sync ==
    /// Persists the cache. Only allowed while online.
    pub fn sync_offline_data(&self) -> Result<()> {
        if self.is_offline() {
            return Err(CacheError::InvalidState(
                "cannot sync while offline".to_string(),
            ));
        }
        self.store.sync()?;
        info!("Offline data synced");
        Ok(())
    }

    /// Stores a value with the offline TTL so it outlives regular entries.
    pub fn cache_offline_data(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let offline_ttl_secs = self.store.config().offline_ttl_secs;
        let ttl = if offline_ttl_secs > 0 {
            Ttl::After(Duration::from_secs(offline_ttl_secs as u64))
        } else {
            Ttl::Default
        };
        self.store.set(key, value, ttl)
    }
}
