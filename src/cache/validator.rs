//! Validator & Repair Module
//!
//! Structural integrity checks over the cache directory and entries, the
//! health report, and best-effort repair of corrupt entries.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::cache::cancel::CancellationFlag;
use crate::cache::entry::{SizeEstimator, META_COMPRESSION_TYPE, META_ORIGINAL_SIZE};
use crate::cache::{CacheEntry, CacheMetrics};
use crate::error::{CacheError, Result};

/// File written and removed to prove the cache directory is writable
pub const SENTINEL_FILE_NAME: &str = ".write_check";

const EXPIRED_RATIO_THRESHOLD: f64 = 0.5;
const CORRUPTED_RATIO_THRESHOLD: f64 = 0.1;
const LOW_HIT_RATE_THRESHOLD: f64 = 0.5;
const LOW_HIT_RATE_MIN_GETS: u64 = 100;

// == Directory Check ==
/// Checks that `dir` exists, is a directory, and accepts a write and delete.
pub fn check_directory_writable(dir: &Path) -> Result<()> {
    let meta = fs::metadata(dir)
        .map_err(|e| CacheError::io(&format!("cache directory {}", dir.display()), e))?;
    if !meta.is_dir() {
        return Err(CacheError::Io(format!(
            "cache path {} is not a directory",
            dir.display()
        )));
    }

    let sentinel = dir.join(SENTINEL_FILE_NAME);
    fs::write(&sentinel, b"sentinel")
        .map_err(|e| CacheError::io(&format!("write sentinel in {}", dir.display()), e))?;
    fs::remove_file(&sentinel)
        .map_err(|e| CacheError::io(&format!("remove sentinel in {}", dir.display()), e))?;
    Ok(())
}

// == Entry Checks ==
/// Lists every structural violation of one entry stored under `map_key`.
pub fn entry_violations(map_key: &str, entry: &CacheEntry, now: DateTime<Utc>) -> Vec<String> {
    let mut violations = Vec::new();

    if entry.key != map_key {
        violations.push(format!(
            "entry '{}': key mismatch (entry reports '{}')",
            map_key, entry.key
        ));
    }
    if entry.size < 0 {
        violations.push(format!("entry '{}': negative size {}", map_key, entry.size));
    }
    if entry.created_at > now {
        violations.push(format!(
            "entry '{}': created_at {} is in the future",
            map_key, entry.created_at
        ));
    }
    if entry.access_count < 0 {
        violations.push(format!(
            "entry '{}': negative access count {}",
            map_key, entry.access_count
        ));
    }
    if entry.compressed {
        violations.extend(
            compression_violation(entry.metadata.as_ref())
                .map(|problem| format!("entry '{}': {}", map_key, problem)),
        );
    }

    violations
}

fn compression_violation(metadata: Option<&Map<String, Value>>) -> Option<String> {
    let Some(metadata) = metadata else {
        return Some("compressed entry has no metadata".to_string());
    };
    if !metadata.contains_key(META_COMPRESSION_TYPE) {
        return Some(format!("compressed entry lacks {}", META_COMPRESSION_TYPE));
    }
    match metadata.get(META_ORIGINAL_SIZE).and_then(Value::as_i64) {
        Some(size) if size >= 0 => None,
        Some(size) => Some(format!("{} is negative ({})", META_ORIGINAL_SIZE, size)),
        None => Some(format!("compressed entry lacks {}", META_ORIGINAL_SIZE)),
    }
}

/// True when the entry has at least one structural violation.
pub fn is_corrupted(map_key: &str, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
    !entry_violations(map_key, entry, now).is_empty()
}

/// Violations across all entries, ordered by key.
pub fn validate_entries(entries: &HashMap<String, CacheEntry>) -> Vec<String> {
    let now = Utc::now();
    let mut keys: Vec<&String> = entries.keys().collect();
    keys.sort();
    keys.into_iter()
        .flat_map(|key| entry_violations(key, &entries[key], now))
        .collect()
}

// == Validate Cache ==
/// Checks the cache directory is writable, then validates every entry.
///
/// Directory problems are returned as-is; entry violations are joined into
/// one `Corruption` error.
pub fn validate_cache(dir: &Path, entries: &HashMap<String, CacheEntry>) -> Result<()> {
    check_directory_writable(dir)?;

    let violations = validate_entries(entries);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(CacheError::Corruption(format!(
            "{} violation(s): {}",
            violations.len(),
            violations.join("; ")
        )))
    }
}

// == Health Report ==
/// Overall health, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Machine-readable finding category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    ExpiredEntries,
    CorruptedEntries,
    SizeLimitExceeded,
    EntryLimitExceeded,
    LowHitRate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthFinding {
    pub kind: FindingKind,
    pub message: String,
}

/// Result of [`check_cache_health`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<HealthFinding>,
    pub warnings: Vec<HealthFinding>,
    pub recommendations: Vec<String>,
    pub total_entries: usize,
    pub expired_entries: usize,
    pub corrupted_entries: usize,
    pub hit_rate: f64,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn has_issue(&self, kind: FindingKind) -> bool {
        self.issues.iter().any(|finding| finding.kind == kind)
    }

    pub fn has_warning(&self, kind: FindingKind) -> bool {
        self.warnings.iter().any(|finding| finding.kind == kind)
    }

    fn issue(&mut self, kind: FindingKind, message: String, status: HealthStatus) {
        self.issues.push(HealthFinding { kind, message });
        self.status = self.status.max(status);
    }
}

/// Classifies cache health from entry state and metrics.
///
/// - expired ratio above 50%: issue, degraded
/// - corrupted ratio above 10%: issue, unhealthy
/// - size or entry ceiling exceeded: issue, degraded
/// - hit rate below 50% after more than 100 gets: warning only
pub fn check_cache_health(
    entries: &HashMap<String, CacheEntry>,
    metrics: &CacheMetrics,
) -> HealthReport {
    let now = Utc::now();
    let total = entries.len();
    let expired = entries.values().filter(|e| e.is_expired_at(now)).count();
    let corrupted = entries
        .iter()
        .filter(|(key, entry)| is_corrupted(key, entry, now))
        .count();
    let ratio = |count: usize| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };

    let mut report = HealthReport {
        status: HealthStatus::Healthy,
        issues: Vec::new(),
        warnings: Vec::new(),
        recommendations: Vec::new(),
        total_entries: total,
        expired_entries: expired,
        corrupted_entries: corrupted,
        hit_rate: metrics.hit_rate(),
        checked_at: now,
    };

    if ratio(expired) > EXPIRED_RATIO_THRESHOLD {
        report.issue(
            FindingKind::ExpiredEntries,
            format!("{} of {} entries are expired", expired, total),
            HealthStatus::Degraded,
        );
        report
            .recommendations
            .push("Run cache cleanup to remove expired entries".to_string());
    }

    if ratio(corrupted) > CORRUPTED_RATIO_THRESHOLD {
        report.issue(
            FindingKind::CorruptedEntries,
            format!("{} of {} entries are corrupted", corrupted, total),
            HealthStatus::Unhealthy,
        );
        report
            .recommendations
            .push("Run cache repair to fix corrupted entries".to_string());
    }

    if metrics.max_size > 0 && metrics.current_size > metrics.max_size {
        report.issue(
            FindingKind::SizeLimitExceeded,
            format!(
                "cache size {} exceeds limit {}",
                metrics.current_size, metrics.max_size
            ),
            HealthStatus::Degraded,
        );
        report
            .recommendations
            .push("Run cache cleanup or raise the size limit".to_string());
    }

    if metrics.max_entries > 0 && metrics.current_entries > metrics.max_entries {
        report.issue(
            FindingKind::EntryLimitExceeded,
            format!(
                "entry count {} exceeds limit {}",
                metrics.current_entries, metrics.max_entries
            ),
            HealthStatus::Degraded,
        );
        report
            .recommendations
            .push("Run cache cleanup or raise the entry limit".to_string());
    }

    if metrics.gets > LOW_HIT_RATE_MIN_GETS && metrics.hit_rate() < LOW_HIT_RATE_THRESHOLD {
        report.warnings.push(HealthFinding {
            kind: FindingKind::LowHitRate,
            message: format!(
                "hit rate {:.1}% over {} gets",
                metrics.hit_rate() * 100.0,
                metrics.gets
            ),
        });
        report
            .recommendations
            .push("Review cache keys and TTLs to improve the hit rate".to_string());
    }

    report
}

// == Repair ==
/// A repaired entry set and its recomputed metrics.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub entries: HashMap<String, CacheEntry>,
    pub metrics: CacheMetrics,
    /// Keys whose entry needed at least one fix
    pub repaired: Vec<String>,
    /// Keys dropped because they had expired
    pub expired: Vec<String>,
    /// Keys dropped because they could not be repaired
    pub unrepairable: Vec<String>,
}

impl RepairOutcome {
    /// Serializable digest without the entry payloads.
    pub fn summary(&self) -> RepairSummary {
        RepairSummary {
            repaired: self.repaired.clone(),
            expired: self.expired.clone(),
            unrepairable: self.unrepairable.clone(),
            entries_after: self.entries.len(),
            size_after: self.metrics.current_size,
        }
    }
}

/// What a repair pass changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairSummary {
    pub repaired: Vec<String>,
    pub expired: Vec<String>,
    pub unrepairable: Vec<String>,
    pub entries_after: usize,
    pub size_after: i64,
}

/// Builds a repaired copy of `entries`.
///
/// Fixes key mismatches, negative sizes (re-estimated from the value),
/// future timestamps (clamped to now), negative access counts and missing
/// metadata. Drops expired entries and compressed entries whose metadata
/// cannot be trusted. Gauges are recomputed; historical counters are
/// carried over. Running it on its own output changes nothing.
///
/// Corrupt input never makes it fail; only cancellation does.
pub fn repair_cache(
    entries: &HashMap<String, CacheEntry>,
    metrics: &CacheMetrics,
    estimator: &SizeEstimator,
    cancel: &CancellationFlag,
) -> Result<RepairOutcome> {
    let now = Utc::now();
    let mut repaired_entries = HashMap::with_capacity(entries.len());
    let mut repaired = Vec::new();
    let mut expired = Vec::new();
    let mut unrepairable = Vec::new();

    for (key, entry) in entries {
        cancel.check("repair")?;

        if entry.is_expired_at(now) {
            expired.push(key.clone());
            continue;
        }
        if entry.compressed && compression_violation(entry.metadata.as_ref()).is_some() {
            warn!(key = %key, "Dropping compressed entry with unusable metadata");
            unrepairable.push(key.clone());
            continue;
        }

        let mut fixed = entry.clone();
        if fixed.key != *key {
            fixed.key = key.clone();
        }
        if fixed.size < 0 {
            fixed.size = estimator(&fixed.value).max(0);
        }
        for stamp in [
            &mut fixed.created_at,
            &mut fixed.updated_at,
            &mut fixed.accessed_at,
        ] {
            if *stamp > now {
                *stamp = now;
            }
        }
        if fixed.access_count < 0 {
            fixed.access_count = 0;
        }
        if fixed.metadata.is_none() {
            fixed.metadata = Some(Map::new());
        }

        if fixed != *entry {
            repaired.push(key.clone());
        }
        repaired_entries.insert(key.clone(), fixed);
    }

    let mut repaired_metrics = metrics.clone();
    repaired_metrics.recompute_gauges(repaired_entries.values());

    repaired.sort();
    expired.sort();
    unrepairable.sort();
    info!(
        repaired = repaired.len(),
        expired = expired.len(),
        unrepairable = unrepairable.len(),
        "Cache repair finished"
    );

    Ok(RepairOutcome {
        entries: repaired_entries,
        metrics: repaired_metrics,
        repaired,
        expired,
        unrepairable,
    })
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::default_size_estimator;
    use chrono::Duration;
    use serde_json::json;

    fn entries(keys: &[&str]) -> HashMap<String, CacheEntry> {
        let now = Utc::now();
        keys.iter()
            .map(|key| {
                (
                    key.to_string(),
                    CacheEntry::new(*key, json!("value"), 5, None, now),
                )
            })
            .collect()
    }

    #[test]
    fn test_check_directory_writable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_directory_writable(dir.path()).is_ok());
        assert!(!dir.path().join(SENTINEL_FILE_NAME).exists());

        let missing = dir.path().join("missing");
        assert!(matches!(check_directory_writable(&missing), Err(CacheError::Io(_))));
    }

    #[test]
    fn test_validate_cache_collects_all_violations() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = entries(&["a", "b", "c"]);
        map.get_mut("a").unwrap().key = "not-a".to_string();
        map.get_mut("b").unwrap().size = -1;
        {
            let c = map.get_mut("c").unwrap();
            c.access_count = -3;
            c.created_at = Utc::now() + Duration::hours(1);
        }

        let err = validate_cache(dir.path(), &map).unwrap_err();
        let message = err.to_string();

        assert!(matches!(err, CacheError::Corruption(_)));
        assert!(message.contains("4 violation(s)"));
        assert!(message.contains("key mismatch"));
        assert!(message.contains("negative size"));
        assert!(message.contains("in the future"));
        assert!(message.contains("negative access count"));
    }

    #[test]
    fn test_compressed_entry_requires_metadata() {
        let now = Utc::now();
        let mut entry = CacheEntry::new("z", json!("v"), 5, None, now);
        entry.compressed = true;
        assert_eq!(entry_violations("z", &entry, now).len(), 1);

        let mut metadata = Map::new();
        metadata.insert(META_COMPRESSION_TYPE.to_string(), json!("gzip"));
        metadata.insert(META_ORIGINAL_SIZE.to_string(), json!(-4));
        entry.metadata = Some(metadata.clone());
        assert!(entry_violations("z", &entry, now)[0].contains("negative"));

        metadata.insert(META_ORIGINAL_SIZE.to_string(), json!(120));
        entry.metadata = Some(metadata);
        assert!(entry_violations("z", &entry, now).is_empty());
    }

    #[test]
    fn test_health_healthy() {
        let map = entries(&["a", "b"]);
        let mut metrics = CacheMetrics::new(1000, 10);
        metrics.recompute_gauges(map.values());

        let report = check_cache_health(&map, &metrics);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.issues.is_empty());
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_health_expired_degrades() {
        let mut map = entries(&["a", "b", "c"]);
        let past = Utc::now() - Duration::seconds(5);
        map.get_mut("a").unwrap().expires_at = Some(past);
        map.get_mut("b").unwrap().expires_at = Some(past);

        let report = check_cache_health(&map, &CacheMetrics::default());
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.has_issue(FindingKind::ExpiredEntries));
        assert_eq!(report.expired_entries, 2);
    }

    #[test]
    fn test_health_corruption_is_unhealthy() {
        let mut map = entries(&["a", "b", "c", "d"]);
        map.get_mut("a").unwrap().size = -1;
        let mut metrics = CacheMetrics::new(1, 1);
        metrics.recompute_gauges(map.values());

        let report = check_cache_health(&map, &metrics);
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.has_issue(FindingKind::CorruptedEntries));
        assert!(report.has_issue(FindingKind::SizeLimitExceeded));
        assert!(report.has_issue(FindingKind::EntryLimitExceeded));
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("repair")));
    }

    #[test]
    fn test_health_low_hit_rate_warns_only() {
        let map = entries(&["a"]);
        let mut metrics = CacheMetrics::default();
        for _ in 0..30 {
            metrics.record_hit();
        }
        for _ in 0..80 {
            metrics.record_miss();
        }

        let report = check_cache_health(&map, &metrics);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.has_warning(FindingKind::LowHitRate));
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_repair_negative_fields() {
        let mut map = entries(&["k"]);
        {
            let entry = map.get_mut("k").unwrap();
            entry.size = -5;
            entry.access_count = -1;
        }

        let outcome = repair_cache(
            &map,
            &CacheMetrics::default(),
            &default_size_estimator(),
            &CancellationFlag::new(),
        )
        .unwrap();

        let entry = &outcome.entries["k"];
        assert!(entry.size >= 0);
        assert_eq!(entry.size, "value".len() as i64);
        assert_eq!(entry.access_count, 0);
        assert_eq!(outcome.repaired, vec!["k".to_string()]);
    }

    #[test]
    fn test_repair_fixes_and_drops() {
        let now = Utc::now();
        let mut map = entries(&["good", "mismatch", "future", "expired", "bare"]);
        map.get_mut("mismatch").unwrap().key = "wrong".to_string();
        map.get_mut("future").unwrap().accessed_at = now + Duration::days(1);
        map.get_mut("expired").unwrap().expires_at = Some(now - Duration::seconds(1));
        map.get_mut("bare").unwrap().metadata = None;
        let mut metrics = CacheMetrics::default();
        metrics.hits = 12;
        metrics.evictions = 3;
        metrics.current_size = 9999;

        let outcome = repair_cache(
            &map,
            &metrics,
            &default_size_estimator(),
            &CancellationFlag::new(),
        )
        .unwrap();

        assert_eq!(outcome.entries.len(), 4);
        assert_eq!(outcome.expired, vec!["expired".to_string()]);
        assert!(outcome.unrepairable.is_empty());
        assert_eq!(outcome.repaired, vec!["bare", "future", "mismatch"]);
        assert_eq!(outcome.entries["mismatch"].key, "mismatch");
        assert!(outcome.entries["future"].accessed_at <= Utc::now());
        assert!(outcome.entries["bare"].metadata.is_some());
        assert_eq!(outcome.metrics.hits, 12);
        assert_eq!(outcome.metrics.evictions, 3);
        assert_eq!(outcome.metrics.current_entries, 4);
        assert_eq!(outcome.metrics.current_size, 20);
        assert!(validate_entries(&outcome.entries).is_empty());
    }

    #[test]
    fn test_repair_is_idempotent() {
        let mut map = entries(&["a", "b"]);
        map.get_mut("a").unwrap().size = -7;
        map.get_mut("b").unwrap().created_at = Utc::now() + Duration::hours(2);
        let estimator = default_size_estimator();
        let cancel = CancellationFlag::new();

        let first = repair_cache(&map, &CacheMetrics::default(), &estimator, &cancel).unwrap();
        let second = repair_cache(&first.entries, &first.metrics, &estimator, &cancel).unwrap();

        assert_eq!(first.entries, second.entries);
        assert_eq!(first.metrics.current_size, second.metrics.current_size);
        assert_eq!(first.metrics.current_entries, second.metrics.current_entries);
        assert!(second.repaired.is_empty());
        assert!(second.expired.is_empty());
        assert!(second.unrepairable.is_empty());
    }

    #[test]
    fn test_repair_drops_compressed_without_metadata() {
        let mut map = entries(&["plain", "packed"]);
        map.get_mut("packed").unwrap().compressed = true;

        let outcome = repair_cache(
            &map,
            &CacheMetrics::default(),
            &default_size_estimator(),
            &CancellationFlag::new(),
        )
        .unwrap();

        assert_eq!(outcome.unrepairable, vec!["packed".to_string()]);
        assert_eq!(outcome.summary().entries_after, 1);
    }

    #[test]
    fn test_repair_cancelled() {
        let map = entries(&["a"]);
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let result = repair_cache(
            &map,
            &CacheMetrics::default(),
            &default_size_estimator(),
            &cancel,
        );
        assert!(matches!(result, Err(CacheError::Cancelled(_))));
    }
}
