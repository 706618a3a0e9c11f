//! Cache Entry Module
//!
//! Defines individual cache entries, the TTL request type and the size
//! estimation heuristic used for byte accounting.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CacheError, Result};

/// Metadata key naming the codec of a compressed entry
pub const META_COMPRESSION_TYPE: &str = "compression_type";
/// Metadata key holding the uncompressed byte size of a compressed entry
pub const META_ORIGINAL_SIZE: &str = "original_size";

// == TTL ==
/// Requested lifetime for an entry written by `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Use the configured default TTL (0 there means never expire)
    #[default]
    Default,
    /// Never expires
    Never,
    /// Expires after the given duration
    After(std::time::Duration),
}

impl Ttl {
    /// Builds a TTL from a seconds count as used on the wire: `None` or 0
    /// selects the default, a negative value means no expiry.
    pub fn from_secs(secs: Option<i64>) -> Self {
        match secs {
            None | Some(0) => Ttl::Default,
            Some(s) if s < 0 => Ttl::Never,
            Some(s) => Ttl::After(std::time::Duration::from_secs(s as u64)),
        }
    }

    /// Resolves the absolute expiry time relative to `now`.
    pub fn expires_at(
        self,
        default_ttl_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        match self {
            Ttl::Never => Ok(None),
            Ttl::Default if default_ttl_secs <= 0 => Ok(None),
            Ttl::Default => Duration::try_seconds(default_ttl_secs)
                .and_then(|delta| now.checked_add_signed(delta))
                .map(Some)
                .ok_or_else(|| {
                    CacheError::InvalidArgument(format!(
                        "default ttl of {}s is too large",
                        default_ttl_secs
                    ))
                }),
            Ttl::After(d) => {
                let delta = Duration::from_std(d)
                    .map_err(|_| CacheError::InvalidArgument(format!("ttl {:?} is too large", d)))?;
                now.checked_add_signed(delta)
                    .map(Some)
                    .ok_or_else(|| CacheError::InvalidArgument(format!("ttl {:?} is too large", d)))
            }
        }
    }
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// Size and access count are signed because entries can come back from a
/// snapshot file in a corrupt state; validation and repair deal with that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key this entry is stored under
    pub key: String,
    /// The stored value
    pub value: Value,
    /// Estimated size in bytes
    pub size: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    /// Expiration time, None = no expiration
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Number of successful reads
    #[serde(default)]
    pub access_count: i64,
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry stamped at `now`.
    pub fn new(
        key: impl Into<String>,
        value: Value,
        size: i64,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            size,
            created_at: now,
            updated_at: now,
            accessed_at: now,
            expires_at,
            access_count: 0,
            compressed: false,
            metadata: Some(Map::new()),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is expired once `now >= expires_at`; entries without an
    /// expiry never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    /// Checks if the entry has expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    // == Time To Live ==
    /// Returns remaining lifetime, or None if no expiration is set.
    ///
    /// Returns `Some(Duration::ZERO)` once the entry has expired.
    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.expires_at.map(|expires| {
            (expires - now)
                .to_std()
                .unwrap_or(std::time::Duration::ZERO)
        })
    }

    /// Records a successful read.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.accessed_at = now;
    }

    /// Size as it counts toward the byte gauge.
    pub fn accounted_size(&self) -> i64 {
        self.size.max(0)
    }
}

// == Size Estimation ==
/// Pluggable estimator mapping a value to its approximate byte size.
pub type SizeEstimator = Arc<dyn Fn(&Value) -> i64 + Send + Sync>;

/// Default heuristic: fixed widths for scalars, byte length for strings and
/// the JSON encoding length for arrays and objects.
///
/// This is an approximation, not an exact memory footprint.
pub fn estimate_size(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 8,
        Value::String(s) => s.len() as i64,
        other => serde_json::to_vec(other)
            .map(|bytes| bytes.len() as i64)
            .unwrap_or(0),
    }
}

/// Returns the default estimator as a shareable closure.
pub fn default_size_estimator() -> SizeEstimator {
    Arc::new(estimate_size)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_creation_no_ttl() {
        let now = Utc::now();
        let entry = CacheEntry::new("k", json!("test_value"), 10, None, now);

        assert_eq!(entry.value, json!("test_value"));
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
        assert_eq!(entry.access_count, 0);
        assert!(entry.metadata.is_some());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = Utc::now();
        let entry = CacheEntry::new("k", json!("v"), 1, Some(now), now);

        assert!(entry.is_expired_at(now), "Entry should be expired at boundary");
        assert!(!entry.is_expired_at(now - Duration::milliseconds(1)));
    }

    #[test]
    fn test_ttl_remaining() {
        let now = Utc::now();
        let entry = CacheEntry::new("k", json!("v"), 1, Some(now + Duration::seconds(10)), now);

        assert_eq!(
            entry.ttl_remaining(now),
            Some(std::time::Duration::from_secs(10))
        );
        assert_eq!(
            entry.ttl_remaining(now + Duration::seconds(20)),
            Some(std::time::Duration::ZERO)
        );

        let forever = CacheEntry::new("k", json!("v"), 1, None, now);
        assert!(forever.ttl_remaining(now).is_none());
    }

    #[test]
    fn test_touch_updates_access_stats() {
        let now = Utc::now();
        let mut entry = CacheEntry::new("k", json!("v"), 1, None, now);
        let later = now + Duration::seconds(5);

        entry.touch(later);
        entry.touch(later);

        assert_eq!(entry.access_count, 2);
        assert_eq!(entry.accessed_at, later);
        assert_eq!(entry.created_at, now);
    }

    #[test]
    fn test_ttl_resolution() {
        let now = Utc::now();

        assert_eq!(Ttl::Never.expires_at(300, now).unwrap(), None);
        assert_eq!(Ttl::Default.expires_at(0, now).unwrap(), None);
        assert_eq!(
            Ttl::Default.expires_at(300, now).unwrap(),
            Some(now + Duration::seconds(300))
        );
        assert_eq!(
            Ttl::After(std::time::Duration::from_millis(100))
                .expires_at(300, now)
                .unwrap(),
            Some(now + Duration::milliseconds(100))
        );
    }

    #[test]
    fn test_default_ttl_out_of_range_is_rejected() {
        let result = Ttl::Default.expires_at(10_000_000_000_000, Utc::now());
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    }

    #[test]
    fn test_ttl_from_secs() {
        assert_eq!(Ttl::from_secs(None), Ttl::Default);
        assert_eq!(Ttl::from_secs(Some(0)), Ttl::Default);
        assert_eq!(Ttl::from_secs(Some(-1)), Ttl::Never);
        assert_eq!(
            Ttl::from_secs(Some(60)),
            Ttl::After(std::time::Duration::from_secs(60))
        );
    }

    #[test]
    fn test_estimate_size() {
        assert_eq!(estimate_size(&Value::Null), 0);
        assert_eq!(estimate_size(&json!(true)), 1);
        assert_eq!(estimate_size(&json!(42)), 8);
        assert_eq!(estimate_size(&json!("hello")), 5);
        assert_eq!(estimate_size(&json!([1, 2])), "[1,2]".len() as i64);
    }

    #[test]
    fn test_entry_json_roundtrip_keeps_negative_fields() {
        let now = Utc::now();
        let mut entry = CacheEntry::new("k", json!("v"), -5, None, now);
        entry.access_count = -1;

        let encoded = serde_json::to_string(&entry).unwrap();
        let decoded: CacheEntry = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.size, -5);
        assert_eq!(decoded.access_count, -1);
    }
}
