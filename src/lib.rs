//! Offline Cache - a persistent key-value cache for offline operation
//!
//! Provides TTL expiration, policy-driven eviction, self-repair, snapshots
//! and an offline-mode gate, served over a small HTTP API.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod offline;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use tasks::spawn_cleanup_task;
