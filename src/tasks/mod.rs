//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Scheduled cleanup: expired, unused and over-size eviction passes

mod cleanup;

pub use cleanup::spawn_cleanup_task;
