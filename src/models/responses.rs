//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::{HealthReport, HealthStatus};

/// Response body for the GET operation (GET /get/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The requested key
    pub key: String,
    /// The stored value
    pub value: Value,
}

impl GetResponse {
    /// Creates a new GetResponse
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for the SET operation (PUT /set)
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
}

impl SetResponse {
    /// Creates a new SetResponse
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for the DELETE operation (DELETE /del/:key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    /// Creates a new DeleteResponse
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for GET /exists/:key
#[derive(Debug, Clone, Serialize)]
pub struct ExistsResponse {
    pub key: String,
    pub exists: bool,
}

/// Response body for the TTL endpoints
#[derive(Debug, Clone, Serialize)]
pub struct TtlResponse {
    pub key: String,
    /// Whole seconds left, `None` when the entry never expires
    pub ttl_secs: Option<u64>,
}

impl TtlResponse {
    pub fn new(key: impl Into<String>, remaining: Option<std::time::Duration>) -> Self {
        Self {
            key: key.into(),
            ttl_secs: remaining.map(|d| d.as_secs()),
        }
    }
}

/// Response body for POST /cache/clean
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanResponse {
    pub expired_removed: usize,
    pub age_removed: usize,
    pub unused_removed: usize,
    pub size_removed: usize,
    pub total_removed: usize,
}

/// Response body for the backup and restore endpoints
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotResponse {
    pub path: String,
    pub entries: usize,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy, degraded or unhealthy
    pub status: HealthStatus,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
    /// Full findings
    pub report: HealthReport,
}

impl HealthResponse {
    pub fn from_report(report: HealthReport) -> Self {
        Self {
            status: report.status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            report,
        }
    }
}

/// Plain acknowledgement for state transitions
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
