//! Scheduled Cleanup Task
//!
//! Background task that periodically runs the cache's rate-limited cleanup.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;

/// Spawns a background task that calls [`CacheStore::scheduled_cleanup`]
/// every `interval_secs` seconds.
///
/// The store locks internally, so the task competes with foreground traffic
/// like any other caller. Each pass runs on the blocking pool so that a held
/// write lock never stalls an async worker. An interval of 0 is treated as
/// 1 second.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let store = Arc::new(CacheStore::new(CacheConfig::default())?);
/// let cleanup_handle = spawn_cleanup_task(store.clone(), 30);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: Arc<CacheStore>, interval_secs: u64) -> JoinHandle<()> {
    let interval_secs = interval_secs.max(1);
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(interval_secs, "Starting scheduled cleanup task");

        loop {
            tokio::time::sleep(interval).await;

            let store = cache.clone();
            let outcome = match tokio::task::spawn_blocking(move || store.scheduled_cleanup()).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(error = %err, "Scheduled cleanup task panicked");
                    continue;
                }
            };

            match outcome {
                Ok(result) if !result.ran => {
                    debug!(reason = ?result.skip_reason, "Scheduled cleanup skipped");
                }
                Ok(result) => {
                    if result.has_errors {
                        warn!(errors = ?result.errors, "Scheduled cleanup finished with errors");
                    }
                    if result.total_removed > 0 {
                        info!(
                            expired = result.expired_removed,
                            unused = result.unused_removed,
                            size = result.size_removed,
                            "Scheduled cleanup removed {} entries",
                            result.total_removed
                        );
                    } else {
                        debug!("Scheduled cleanup: nothing to remove");
                    }
                }
                Err(err) => warn!(error = %err, "Scheduled cleanup failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheListener, EvictionReason, Ttl};
    use crate::config::CacheConfig;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::thread::{self, ThreadId};

    fn store() -> Arc<CacheStore> {
        let config = CacheConfig {
            sync_interval_secs: 1,
            ..CacheConfig::default()
        };
        Arc::new(CacheStore::new(config).unwrap())
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let cache = store();
        cache
            .set("expire_soon", json!("value"), Ttl::After(Duration::from_millis(300)))
            .unwrap();

        let handle = spawn_cleanup_task(cache.clone(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;

        // peek does not evict, so absence proves the task swept it
        assert!(cache.peek("expire_soon").is_none());
        assert!(cache.metrics().last_cleanup.is_some());

        handle.abort();
    }

    #[derive(Default)]
    struct EvictionThread(Mutex<Option<ThreadId>>);

    impl CacheListener for EvictionThread {
        fn on_cache_eviction(&self, _key: &str, _reason: EvictionReason) {
            *self.0.lock() = Some(thread::current().id());
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_cleanup_runs_off_the_async_worker() {
        let cache = store();
        let seen = Arc::new(EvictionThread::default());
        cache.add_listener(seen.clone());
        cache
            .set("expire_soon", json!("value"), Ttl::After(Duration::from_millis(100)))
            .unwrap();

        let handle = spawn_cleanup_task(cache.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.abort();

        let evicted_on = seen.0.lock().expect("entry was evicted");
        assert_ne!(evicted_on, thread::current().id());
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let cache = store();
        cache
            .set("long_lived", json!("value"), Ttl::After(Duration::from_secs(3600)))
            .unwrap();

        let handle = spawn_cleanup_task(cache.clone(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(cache.get("long_lived").unwrap(), json!("value"));

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let handle = spawn_cleanup_task(store(), 1);

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
