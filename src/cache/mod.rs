//! Cache Module
//!
//! Provides the in-memory cache engine: TTL expiration, policy-driven
//! eviction, maintenance passes, validation and repair, and snapshots.

mod cancel;
mod entry;
mod eviction;
pub mod maintenance;
mod metrics;
pub mod persist;
mod state;
mod store;
pub mod validator;


// Re-export public types
pub use cancel::CancellationFlag;
pub use entry::{default_size_estimator, estimate_size, CacheEntry, SizeEstimator, Ttl};
pub use eviction::eviction_order;
pub use maintenance::{CompactionResult, MaintenanceResult, ScheduledCleanupResult};
pub use metrics::{CacheMetrics, PerformanceStats};
pub use state::{CacheEvent, CacheState, EvictionReason};
pub use store::{CacheListener, CacheReport, CacheStore};
pub use validator::{HealthReport, HealthStatus, RepairSummary};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed value size in bytes
pub const MAX_VALUE_SIZE: i64 = 1024 * 1024; // 1 MB
