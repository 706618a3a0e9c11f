//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;
use serde_json::Value;

use crate::cache::{persist, Ttl, MAX_KEY_LENGTH};
use crate::error::{CacheError, Result};

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The cache key, namespaced as `<category>:<name>`
/// - `value`: Any JSON value
/// - `ttl`: Optional TTL in seconds; absent or 0 uses the default,
///   negative never expires
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: Value,
    /// Optional TTL in seconds
    #[serde(default)]
    pub ttl: Option<i64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        None
    }

    pub fn ttl(&self) -> Ttl {
        Ttl::from_secs(self.ttl)
    }
}

/// Request body for PUT /ttl/:key
#[derive(Debug, Clone, Deserialize)]
pub struct TtlRequest {
    /// New TTL in seconds, same conventions as [`SetRequest::ttl`]
    pub ttl: i64,
}

impl TtlRequest {
    pub fn ttl(&self) -> Ttl {
        Ttl::from_secs(Some(self.ttl))
    }
}

/// Request body for POST /cache/clean
///
/// Expired entries are always swept; each optional field adds one pass.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CleanRequest {
    /// Remove entries created more than this many seconds ago
    pub max_age_secs: Option<i64>,
    /// Remove entries not accessed for this many seconds
    pub unused_secs: Option<i64>,
    /// Evict by policy until at most this many bytes remain
    pub target_size: Option<i64>,
}

/// Checked passes of a [`CleanRequest`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanPasses {
    pub max_age: Option<Duration>,
    pub unused: Option<Duration>,
    pub target_size: Option<i64>,
}

fn positive_secs(field: &str, secs: Option<i64>) -> Result<Option<Duration>> {
    secs.map(|secs| {
        Duration::try_seconds(secs)
            .filter(|d| *d > Duration::zero())
            .ok_or_else(|| {
                CacheError::InvalidArgument(format!(
                    "{} must be a positive number of seconds, got {}",
                    field, secs
                ))
            })
    })
    .transpose()
}

impl CleanRequest {
    /// Checks every field so that a bad one rejects the request before any
    /// pass runs.
    pub fn passes(&self) -> Result<CleanPasses> {
        let max_age = positive_secs("max_age_secs", self.max_age_secs)?;
        let unused = positive_secs("unused_secs", self.unused_secs)?;
        if let Some(target) = self.target_size.filter(|t| *t < 0) {
            return Err(CacheError::InvalidArgument(format!(
                "target_size must not be negative, got {}",
                target
            )));
        }
        Ok(CleanPasses {
            max_age,
            unused,
            target_size: self.target_size,
        })
    }
}

/// Request body for POST /cache/backup and POST /cache/restore
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnapshotRequest {
    /// Snapshot file relative to the cache directory; defaults to `cache.json`
    pub path: Option<String>,
}

impl SnapshotRequest {
    /// Resolves the requested file inside `cache_dir`.
    ///
    /// Absolute paths and `..` components are rejected so a client cannot
    /// read or write outside the cache directory.
    pub fn resolve(&self, cache_dir: &Path) -> Result<PathBuf> {
        let Some(requested) = self.path.as_deref() else {
            return Ok(cache_dir.join(persist::SNAPSHOT_FILE_NAME));
        };
        let relative = Path::new(requested);
        if relative.is_absolute() || relative.has_root() {
            return Err(CacheError::InvalidArgument(format!(
                "snapshot path {} must be relative to the cache directory",
                requested
            )));
        }
        persist::check_path(relative)?;
        Ok(cache_dir.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_request_deserialize() {
        let json = r#"{"key": "templates:list", "value": ["web", "cli"]}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.key, "templates:list");
        assert_eq!(req.value, json!(["web", "cli"]));
        assert!(req.ttl.is_none());
        assert_eq!(req.ttl(), Ttl::Default);
    }

    #[test]
    fn test_set_request_with_ttl() {
        let json = r#"{"key": "test", "value": "hello", "ttl": 60}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.ttl, Some(60));
        assert_eq!(req.ttl(), Ttl::After(std::time::Duration::from_secs(60)));
    }

    #[test]
    fn test_set_request_negative_ttl_never_expires() {
        let json = r#"{"key": "test", "value": 1, "ttl": -1}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.ttl(), Ttl::Never);
    }

    #[test]
    fn test_validate_empty_key() {
        let req = SetRequest {
            key: "".to_string(),
            value: json!("test"),
            ttl: None,
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_valid_request() {
        let req = SetRequest {
            key: "valid_key".to_string(),
            value: json!("test"),
            ttl: Some(60),
        };
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_optional_bodies_default() {
        let clean: CleanRequest = serde_json::from_str("{}").unwrap();
        assert!(clean.max_age_secs.is_none() && clean.target_size.is_none());
        let snapshot: SnapshotRequest = serde_json::from_str(r#"{"path": "b.json"}"#).unwrap();
        assert_eq!(snapshot.path.as_deref(), Some("b.json"));
    }

    #[test]
    fn test_clean_passes_checks_every_field_first() {
        let req = CleanRequest {
            max_age_secs: Some(60),
            unused_secs: Some(0),
            target_size: Some(10),
        };
        assert!(matches!(req.passes(), Err(CacheError::InvalidArgument(_))));

        let req = CleanRequest {
            target_size: Some(-1),
            ..CleanRequest::default()
        };
        assert!(req.passes().is_err());

        let req = CleanRequest {
            max_age_secs: Some(i64::MAX),
            ..CleanRequest::default()
        };
        assert!(req.passes().is_err());

        let req = CleanRequest {
            max_age_secs: Some(60),
            unused_secs: None,
            target_size: Some(0),
        };
        let passes = req.passes().unwrap();
        assert_eq!(passes.max_age, Some(Duration::seconds(60)));
        assert_eq!(passes.target_size, Some(0));
    }

    #[test]
    fn test_snapshot_path_confined_to_cache_dir() {
        let dir = Path::new("/var/cache/offline");
        let req = |path: Option<&str>| SnapshotRequest {
            path: path.map(str::to_string),
        };

        assert_eq!(req(None).resolve(dir).unwrap(), dir.join("cache.json"));
        assert_eq!(
            req(Some("backups/b.json")).resolve(dir).unwrap(),
            dir.join("backups/b.json")
        );
        assert!(matches!(
            req(Some("/etc/passwd")).resolve(dir),
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(req(Some("../b.json")).resolve(dir).is_err());
        assert!(req(Some("")).resolve(dir).is_err());
    }
}
