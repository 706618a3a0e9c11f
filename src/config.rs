//! Configuration Module
//!
//! Handles loading, defaulting and validating cache configuration from
//! environment variables.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Longest TTL, threshold or interval accepted, 100 years
pub const MAX_DURATION_SECS: i64 = 100 * 365 * 24 * 60 * 60;

// == Eviction Policy ==
/// Order in which entries are chosen for eviction under pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently accessed first
    #[default]
    Lru,
    /// Lowest access count first
    Lfu,
    /// Oldest creation first
    Fifo,
    /// Soonest expiry first, entries without expiry last
    Ttl,
}

impl FromStr for EvictionPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "fifo" => Ok(EvictionPolicy::Fifo),
            "ttl" => Ok(EvictionPolicy::Ttl),
            other => Err(CacheError::InvalidArgument(format!(
                "unknown eviction policy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Fifo => "fifo",
            EvictionPolicy::Ttl => "ttl",
        };
        f.write_str(name)
    }
}

// == Compression Type ==
/// Compression codec recorded in compressed entries' metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    #[default]
    Gzip,
    Zlib,
    Lz4,
}

impl FromStr for CompressionType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" => Ok(CompressionType::Gzip),
            "zlib" => Ok(CompressionType::Zlib),
            "lz4" => Ok(CompressionType::Lz4),
            other => Err(CacheError::InvalidArgument(format!(
                "unknown compression type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionType::Gzip => "gzip",
            CompressionType::Zlib => "zlib",
            CompressionType::Lz4 => "lz4",
        };
        f.write_str(name)
    }
}

// == Cache Config ==
/// Cache engine configuration.
///
/// Sizes are signed so that values handed over by an external loader can be
/// checked by [`CacheConfig::validate`] instead of silently wrapping.
/// A `max_size` or `max_entries` of 0 means unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte ceiling for the sum of entry sizes
    pub max_size: i64,
    /// Entry count ceiling
    pub max_entries: i64,
    /// TTL in seconds applied by `Ttl::Default`; 0 = never expires
    pub default_ttl_secs: i64,
    /// Victim ordering under pressure
    pub eviction_policy: EvictionPolicy,
    /// Fraction of the limit freed when a ceiling is breached
    pub eviction_ratio: f64,
    pub enable_compression: bool,
    pub compression_level: u32,
    pub compression_type: CompressionType,
    /// TTL in seconds for data cached for offline use
    pub offline_ttl_secs: i64,
    /// Minimum seconds between scheduled cleanups
    pub sync_interval_secs: u64,
    /// Entries idle for longer than this are dropped by scheduled cleanup
    pub unused_threshold_secs: i64,
    /// Directory holding the persisted snapshot
    pub cache_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100 * 1024 * 1024,
            max_entries: 10_000,
            default_ttl_secs: 24 * 60 * 60,
            eviction_policy: EvictionPolicy::Lru,
            eviction_ratio: 0.1,
            enable_compression: false,
            compression_level: 6,
            compression_type: CompressionType::Gzip,
            offline_ttl_secs: 7 * 24 * 60 * 60,
            sync_interval_secs: 30,
            unused_threshold_secs: 7 * 24 * 60 * 60,
            cache_dir: PathBuf::from(".cache/offline"),
        }
    }
}

impl CacheConfig {
    // == Validate ==
    /// Checks every numeric invariant and reports all violations at once.
    ///
    /// Unknown policy and compression names never reach this point: they are
    /// rejected when parsed.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.max_size < 0 {
            problems.push(format!("max_size must not be negative (got {})", self.max_size));
        }
        if self.max_entries < 0 {
            problems.push(format!(
                "max_entries must not be negative (got {})",
                self.max_entries
            ));
        }
        if !(0.0..=1.0).contains(&self.eviction_ratio) {
            problems.push(format!(
                "eviction_ratio must be within [0, 1] (got {})",
                self.eviction_ratio
            ));
        }
        if self.enable_compression && !(1..=9).contains(&self.compression_level) {
            problems.push(format!(
                "compression_level must be within [1, 9] (got {})",
                self.compression_level
            ));
        }
        if self.default_ttl_secs < 0 {
            problems.push(format!(
                "default_ttl must not be negative (got {})",
                self.default_ttl_secs
            ));
        }
        if self.offline_ttl_secs < 0 {
            problems.push(format!(
                "offline_ttl must not be negative (got {})",
                self.offline_ttl_secs
            ));
        }
        if self.unused_threshold_secs <= 0 {
            problems.push(format!(
                "unused_threshold must be positive (got {})",
                self.unused_threshold_secs
            ));
        }
        for (name, secs) in [
            ("default_ttl", self.default_ttl_secs),
            ("offline_ttl", self.offline_ttl_secs),
            ("unused_threshold", self.unused_threshold_secs),
            (
                "sync_interval",
                i64::try_from(self.sync_interval_secs).unwrap_or(i64::MAX),
            ),
        ] {
            if secs > MAX_DURATION_SECS {
                problems.push(format!(
                    "{} must not exceed {}s (got {})",
                    name, MAX_DURATION_SECS, secs
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CacheError::InvalidArgument(problems.join("; ")))
        }
    }

    /// Size ceiling as an option, `None` when unlimited.
    pub fn size_limit(&self) -> Option<i64> {
        (self.max_size > 0).then_some(self.max_size)
    }

    /// Entry ceiling as an option, `None` when unlimited.
    pub fn entry_limit(&self) -> Option<usize> {
        (self.max_entries > 0).then_some(self.max_entries as usize)
    }

    /// Target reached after a ceiling is breached: `limit × (1 − ratio)`.
    pub fn relief_target(&self, limit: i64) -> i64 {
        let ratio = self.eviction_ratio.clamp(0.0, 1.0);
        (limit as f64 * (1.0 - ratio)).floor() as i64
    }

    /// Creates a CacheConfig from `CACHE_*` environment variables.
    ///
    /// Malformed numbers fall back to defaults; unknown policy or compression
    /// names are errors.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let eviction_policy = match env::var("CACHE_EVICTION_POLICY") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.eviction_policy,
        };
        let compression_type = match env::var("CACHE_COMPRESSION_TYPE") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.compression_type,
        };

        Ok(Self {
            max_size: env_or("CACHE_MAX_SIZE", defaults.max_size),
            max_entries: env_or("CACHE_MAX_ENTRIES", defaults.max_entries),
            default_ttl_secs: env_or("CACHE_DEFAULT_TTL", defaults.default_ttl_secs),
            eviction_policy,
            eviction_ratio: env_or("CACHE_EVICTION_RATIO", defaults.eviction_ratio),
            enable_compression: env_or("CACHE_ENABLE_COMPRESSION", defaults.enable_compression),
            compression_level: env_or("CACHE_COMPRESSION_LEVEL", defaults.compression_level),
            compression_type,
            offline_ttl_secs: env_or("CACHE_OFFLINE_TTL", defaults.offline_ttl_secs),
            sync_interval_secs: env_or("CACHE_SYNC_INTERVAL", defaults.sync_interval_secs),
            unused_threshold_secs: env_or(
                "CACHE_UNUSED_THRESHOLD",
                defaults.unused_threshold_secs,
            ),
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
        })
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Cache engine settings
    pub cache: CacheConfig,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_*` - see [`CacheConfig::from_env`]
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server_port: env_or("SERVER_PORT", 3000),
            cache: CacheConfig::from_env()?,
        })
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
