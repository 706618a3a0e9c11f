//! Eviction & Cleanup Engine
//!
//! Stateless passes over a [`CacheState`]. Callers hand in exclusive access,
//! either the live state under the store's write lock or a private copy.
//! Argument errors are raised before anything is removed.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Map;
use tracing::{debug, info, warn};

use crate::cache::cancel::CancellationFlag;
use crate::cache::eviction::evict_until;
use crate::cache::state::{CacheState, EvictionReason};
use crate::cache::validator::validate_entries;
use crate::cache::CacheMetrics;
use crate::config::{CacheConfig, EvictionPolicy};
use crate::error::{CacheError, Result};

// == Clean Expired ==
/// Removes every entry whose expiry has passed. Entries without an expiry
/// are never touched.
pub fn clean_expired_entries(state: &mut CacheState) -> Result<usize> {
    let now = Utc::now();
    let removed = state.evict_where(EvictionReason::Expired, |entry| entry.is_expired_at(now));
    state.metrics.last_cleanup = Some(now);
    Ok(removed)
}

// == Cleanup By Age ==
/// Removes entries created before `now - max_age`.
///
/// An age reaching past the earliest representable date removes nothing.
pub fn cleanup_by_age(state: &mut CacheState, max_age: Duration) -> Result<usize> {
    if max_age <= Duration::zero() {
        return Err(CacheError::InvalidArgument(format!(
            "max age must be positive (got {}s)",
            max_age.num_seconds()
        )));
    }
    let cutoff = Utc::now()
        .checked_sub_signed(max_age)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    Ok(state.evict_where(EvictionReason::Age, |entry| entry.created_at < cutoff))
}

// == Cleanup By Size ==
/// Evicts entries in `policy` order until the byte gauge is at or below
/// `target_size` or the cache is empty.
pub fn cleanup_by_size(
    state: &mut CacheState,
    target_size: i64,
    policy: EvictionPolicy,
) -> Result<usize> {
    if target_size < 0 {
        return Err(CacheError::InvalidArgument(format!(
            "target size must not be negative (got {})",
            target_size
        )));
    }
    Ok(evict_until(state, policy, EvictionReason::Size, &[], |s| {
        s.metrics.current_size <= target_size
    }))
}

// == Cleanup Unused ==
/// Removes entries not read since `now - threshold`.
pub fn cleanup_unused_entries(state: &mut CacheState, threshold: Duration) -> Result<usize> {
    if threshold <= Duration::zero() {
        return Err(CacheError::InvalidArgument(format!(
            "unused threshold must be positive (got {}s)",
            threshold.num_seconds()
        )));
    }
    let cutoff = Utc::now()
        .checked_sub_signed(threshold)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    Ok(state.evict_where(EvictionReason::Unused, |entry| entry.accessed_at < cutoff))
}

// == Compaction ==
/// Before/after figures of a compaction pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompactionResult {
    pub entries_before: usize,
    pub entries_after: usize,
    pub size_before: i64,
    pub size_after: i64,
    pub removed: usize,
    pub bytes_freed: i64,
    pub duration_ms: u64,
}

/// Sweeps expired entries and reports the size and entry deltas.
pub fn compact_cache(state: &mut CacheState) -> Result<CompactionResult> {
    let started = Instant::now();
    let entries_before = state.len();
    let size_before = state.metrics.current_size;

    let removed = clean_expired_entries(state)?;
    state.metrics.last_compaction = Some(Utc::now());

    let result = CompactionResult {
        entries_before,
        entries_after: state.len(),
        size_before,
        size_after: state.metrics.current_size,
        removed,
        bytes_freed: size_before - state.metrics.current_size,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    debug!(?result, "Compaction finished");
    Ok(result)
}

// == Maintenance ==
/// Outcome of one maintenance task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceTask {
    pub name: String,
    pub success: bool,
    pub items_affected: usize,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Aggregated report of a maintenance pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceResult {
    /// True only when every task succeeded
    pub success: bool,
    pub tasks: Vec<MaintenanceTask>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl MaintenanceResult {
    pub fn task(&self, name: &str) -> Option<&MaintenanceTask> {
        self.tasks.iter().find(|task| task.name == name)
    }
}

fn run_task<F>(name: &str, task: F) -> MaintenanceTask
where
    F: FnOnce() -> Result<usize>,
{
    let started = Instant::now();
    let outcome = task();
    let duration_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(items_affected) => MaintenanceTask {
            name: name.to_string(),
            success: true,
            items_affected,
            error: None,
            duration_ms,
        },
        Err(err) => {
            warn!(task = name, error = %err, "Maintenance task failed");
            MaintenanceTask {
                name: name.to_string(),
                success: false,
                items_affected: 0,
                error: Some(err.to_string()),
                duration_ms,
            }
        }
    }
}

/// Runs expired cleanup, a structural validation pass and the structure
/// optimisation pass, in that order.
///
/// A failing task does not stop the others. Cancellation is checked between
/// tasks and between entries and aborts the whole pass with `Cancelled`; the
/// caller is expected to be working on a copy.
pub fn perform_maintenance(
    state: &mut CacheState,
    cancel: &CancellationFlag,
) -> Result<MaintenanceResult> {
    let started_at = Utc::now();
    let started = Instant::now();
    let mut tasks = Vec::with_capacity(3);

    cancel.check("maintenance")?;
    tasks.push(run_task("clean_expired", || clean_expired_entries(state)));

    cancel.check("maintenance")?;
    tasks.push(run_task("validate_structure", || {
        let violations = validate_entries(&state.entries);
        if violations.is_empty() {
            Ok(0)
        } else {
            Err(CacheError::Corruption(violations.join("; ")))
        }
    }));

    cancel.check("maintenance")?;
    tasks.push(run_task("optimize_structure", || {
        optimize_structure(state, cancel)
    }));
    cancel.check("maintenance")?;

    let result = MaintenanceResult {
        success: tasks.iter().all(|task| task.success),
        tasks,
        started_at,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        success = result.success,
        duration_ms = result.duration_ms,
        "Maintenance pass finished"
    );
    Ok(result)
}

/// Backfills missing metadata maps and pulls `updated_at` / `accessed_at`
/// values that predate `created_at` up to `created_at`.
///
/// Returns the number of entries changed.
pub fn optimize_structure(state: &mut CacheState, cancel: &CancellationFlag) -> Result<usize> {
    let mut changed = 0;
    for entry in state.entries.values_mut() {
        cancel.check("optimize structure")?;
        let mut touched = false;
        if entry.metadata.is_none() {
            entry.metadata = Some(Map::new());
            touched = true;
        }
        if entry.updated_at < entry.created_at {
            entry.updated_at = entry.created_at;
            touched = true;
        }
        if entry.accessed_at < entry.created_at {
            entry.accessed_at = entry.created_at;
            touched = true;
        }
        if touched {
            changed += 1;
        }
    }
    Ok(changed)
}

// == Scheduled Cleanup ==
/// Condition that let a scheduled cleanup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTrigger {
    /// The sync interval elapsed since the last cleanup
    Interval,
    /// The byte gauge exceeds the configured ceiling
    SizeLimit,
}

/// Report of one scheduled cleanup attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledCleanupResult {
    pub ran: bool,
    pub skip_reason: Option<String>,
    pub triggers: Vec<CleanupTrigger>,
    pub expired_removed: usize,
    pub unused_removed: usize,
    pub size_removed: usize,
    pub total_removed: usize,
    pub errors: Vec<String>,
    pub has_errors: bool,
    pub duration_ms: u64,
}

impl ScheduledCleanupResult {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            ran: false,
            skip_reason: Some(reason.into()),
            triggers: Vec::new(),
            expired_removed: 0,
            unused_removed: 0,
            size_removed: 0,
            total_removed: 0,
            errors: Vec::new(),
            has_errors: false,
            duration_ms: 0,
        }
    }
}

/// True when no cleanup has run yet or at least `interval_secs` passed since
/// the last one. An interval too long to represent never elapses.
pub fn interval_elapsed(
    last_cleanup: Option<DateTime<Utc>>,
    interval_secs: u64,
    now: DateTime<Utc>,
) -> bool {
    let Some(last) = last_cleanup else {
        return true;
    };
    i64::try_from(interval_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|interval| last.checked_add_signed(interval))
        .is_some_and(|due| now >= due)
}

/// True when a size ceiling is configured and the byte gauge exceeds it.
pub fn over_size_limit(metrics: &CacheMetrics, config: &CacheConfig) -> bool {
    config
        .size_limit()
        .is_some_and(|limit| metrics.current_size > limit)
}

/// Rate-limited cleanup entry point used by the background task.
///
/// Runs when [`interval_elapsed`] or [`over_size_limit`] holds, otherwise
/// reports why it skipped. A run removes expired entries, then entries idle
/// past `unused_threshold_secs`, then, if still over the ceiling, evicts down
/// to `max_size × (1 − eviction_ratio)`. Task errors are collected.
pub fn scheduled_cleanup(
    state: &mut CacheState,
    config: &CacheConfig,
    now: DateTime<Utc>,
) -> Result<ScheduledCleanupResult> {
    let mut triggers = Vec::new();
    if interval_elapsed(state.metrics.last_cleanup, config.sync_interval_secs, now) {
        triggers.push(CleanupTrigger::Interval);
    }
    if over_size_limit(&state.metrics, config) {
        triggers.push(CleanupTrigger::SizeLimit);
    }
    if triggers.is_empty() {
        return Ok(ScheduledCleanupResult::skipped(format!(
            "last cleanup less than {}s ago and size within limit",
            config.sync_interval_secs
        )));
    }

    let started = Instant::now();
    let mut errors = Vec::new();
    let mut collect = |outcome: Result<usize>| match outcome {
        Ok(count) => count,
        Err(err) => {
            errors.push(err.to_string());
            0
        }
    };

    let expired_removed = collect(clean_expired_entries(state));
    let unused_removed = collect(
        Duration::try_seconds(config.unused_threshold_secs)
            .ok_or_else(|| {
                CacheError::InvalidArgument(format!(
                    "unused threshold of {}s is too large",
                    config.unused_threshold_secs
                ))
            })
            .and_then(|threshold| cleanup_unused_entries(state, threshold)),
    );
    let size_removed = match config.size_limit() {
        Some(limit) if over_size_limit(&state.metrics, config) => collect(cleanup_by_size(
            state,
            config.relief_target(limit),
            config.eviction_policy,
        )),
        _ => 0,
    };
    state.metrics.last_cleanup = Some(now);

    Ok(ScheduledCleanupResult {
        ran: true,
        skip_reason: None,
        triggers,
        expired_removed,
        unused_removed,
        size_removed,
        total_removed: expired_removed + unused_removed + size_removed,
        has_errors: !errors.is_empty(),
        errors,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}
