//! Cache Metrics Module
//!
//! Tracks cache activity counters, physical gauges and derived performance
//! numbers. Pure bookkeeping: it never looks at entry contents.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;

// == Cache Metrics ==
/// Counters, gauges and maintenance timestamps for one cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of retrievals, hits plus misses
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Number of entries removed by expiry or pressure
    pub evictions: u64,

    /// Sum of live entry sizes in bytes
    pub current_size: i64,
    pub max_size: i64,
    /// Number of live entries
    pub current_entries: usize,
    pub max_entries: usize,
    pub hit_rate: f64,
    pub miss_rate: f64,

    #[serde(default)]
    pub last_cleanup: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_compaction: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_backup: Option<DateTime<Utc>>,
    /// Collector construction time, basis for uptime
    #[serde(default = "Utc::now")]
    pub started_at: DateTime<Utc>,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl CacheMetrics {
    // == Constructor ==
    /// Creates a collector with all counters at zero and the given limits.
    pub fn new(max_size: i64, max_entries: usize) -> Self {
        Self {
            hits: 0,
            misses: 0,
            gets: 0,
            sets: 0,
            deletes: 0,
            evictions: 0,
            current_size: 0,
            max_size,
            current_entries: 0,
            max_entries,
            hit_rate: 0.0,
            miss_rate: 0.0,
            last_cleanup: None,
            last_compaction: None,
            last_backup: None,
            started_at: Utc::now(),
        }
    }

    // == Record Hit ==
    pub fn record_hit(&mut self) {
        self.hits += 1;
        self.gets += 1;
        self.refresh_rates();
    }

    // == Record Miss ==
    pub fn record_miss(&mut self) {
        self.misses += 1;
        self.gets += 1;
        self.refresh_rates();
    }

    // == Record Set ==
    /// Counts a write and shifts the byte gauge by the size delta between the
    /// new and the replaced entry.
    pub fn record_set(&mut self, size_delta: i64, new_entry: bool) {
        self.sets += 1;
        self.adjust_size(size_delta);
        if new_entry {
            self.current_entries += 1;
        }
    }

    // == Record Delete ==
    pub fn record_delete(&mut self, size: i64) {
        self.deletes += 1;
        self.release(size);
    }

    // == Record Eviction ==
    pub fn record_eviction(&mut self, size: i64) {
        self.evictions += 1;
        self.release(size);
    }

    fn release(&mut self, size: i64) {
        self.adjust_size(-size);
        self.current_entries = self.current_entries.saturating_sub(1);
    }

    /// Shifts the byte gauge, never below zero.
    pub fn adjust_size(&mut self, delta: i64) {
        self.current_size = self.current_size.saturating_add(delta).max(0);
    }

    // == Rates ==
    /// Hits / gets, or 0.0 if no retrievals have been made.
    pub fn hit_rate(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.hits as f64 / self.gets as f64
        }
    }

    /// Misses / gets, or 0.0 if no retrievals have been made.
    pub fn miss_rate(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.misses as f64 / self.gets as f64
        }
    }

    fn refresh_rates(&mut self) {
        self.hit_rate = self.hit_rate();
        self.miss_rate = self.miss_rate();
    }

    // == Reset ==
    /// Zeroes activity counters. Gauges and limits describe physical state
    /// and are kept.
    pub fn reset(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.gets = 0;
        self.sets = 0;
        self.deletes = 0;
        self.evictions = 0;
        self.refresh_rates();
    }

    /// Wall-clock time since the collector was constructed.
    pub fn uptime(&self) -> Duration {
        Utc::now() - self.started_at
    }

    pub fn set_limits(&mut self, max_size: i64, max_entries: usize) {
        self.max_size = max_size;
        self.max_entries = max_entries;
    }

    /// Rebuilds the size and entry gauges from the live entries.
    pub fn recompute_gauges<'a>(&mut self, entries: impl IntoIterator<Item = &'a CacheEntry>) {
        let (count, size) = entries
            .into_iter()
            .fold((0usize, 0i64), |(count, size), entry| {
                (count + 1, size.saturating_add(entry.accounted_size()))
            });
        self.current_entries = count;
        self.current_size = size;
        self.refresh_rates();
    }

    // == Performance ==
    /// Derived performance numbers for reporting.
    pub fn performance(&self) -> PerformanceStats {
        let uptime_secs = (self.uptime().num_milliseconds().max(0) as f64) / 1000.0;
        let operations = self.gets + self.sets + self.deletes;
        let operations_per_second = if uptime_secs > 0.0 {
            operations as f64 / uptime_secs
        } else {
            0.0
        };
        let average_entry_size = if self.current_entries > 0 {
            self.current_size as f64 / self.current_entries as f64
        } else {
            0.0
        };

        PerformanceStats {
            hit_rate: self.hit_rate(),
            miss_rate: self.miss_rate(),
            uptime_secs,
            total_operations: operations,
            operations_per_second,
            average_entry_size,
            size_utilization: percentage(self.current_size as f64, self.max_size as f64),
            entry_utilization: percentage(self.current_entries as f64, self.max_entries as f64),
        }
    }
}

fn percentage(current: f64, limit: f64) -> f64 {
    if limit > 0.0 {
        current / limit * 100.0
    } else {
        0.0
    }
}

// == Performance Stats ==
/// Numbers derived from the metrics for the `cache show` view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub uptime_secs: f64,
    pub total_operations: u64,
    pub operations_per_second: f64,
    /// Mean entry size in bytes
    pub average_entry_size: f64,
    /// Percentage of the byte ceiling in use, 0 when unlimited
    pub size_utilization: f64,
    /// Percentage of the entry ceiling in use, 0 when unlimited
    pub entry_utilization: f64,
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metrics_new() {
        let metrics = CacheMetrics::new(1024, 10);
        assert_eq!(metrics.hits, 0);
        assert_eq!(metrics.misses, 0);
        assert_eq!(metrics.evictions, 0);
        assert_eq!(metrics.current_entries, 0);
        assert_eq!(metrics.max_size, 1024);
        assert_eq!(metrics.max_entries, 10);
    }

    #[test]
    fn test_rates_no_requests() {
        let metrics = CacheMetrics::default();
        assert_eq!(metrics.hit_rate(), 0.0);
        assert_eq!(metrics.miss_rate(), 0.0);
    }

    #[test]
    fn test_rates_mixed() {
        let mut metrics = CacheMetrics::default();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();

        assert_eq!(metrics.gets, 4);
        assert_eq!(metrics.hit_rate(), 0.75);
        assert_eq!(metrics.miss_rate(), 0.25);
        assert_eq!(metrics.hit_rate, 0.75);
        assert!((metrics.hit_rate() + metrics.miss_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_set_and_delete_adjust_gauges() {
        let mut metrics = CacheMetrics::default();
        metrics.record_set(10, true);
        metrics.record_set(20, true);
        // overwrite of the 20-byte entry with 5 bytes
        metrics.record_set(-15, false);

        assert_eq!(metrics.sets, 3);
        assert_eq!(metrics.current_size, 15);
        assert_eq!(metrics.current_entries, 2);

        metrics.record_delete(10);
        assert_eq!(metrics.deletes, 1);
        assert_eq!(metrics.current_size, 5);
        assert_eq!(metrics.current_entries, 1);

        metrics.record_eviction(5);
        assert_eq!(metrics.evictions, 1);
        assert_eq!(metrics.current_size, 0);
        assert_eq!(metrics.current_entries, 0);
    }

    #[test]
    fn test_size_never_negative() {
        let mut metrics = CacheMetrics::default();
        metrics.record_set(5, true);
        metrics.record_eviction(50);
        metrics.record_eviction(50);

        assert_eq!(metrics.current_size, 0);
        assert_eq!(metrics.current_entries, 0);
    }

    #[test]
    fn test_reset_keeps_gauges() {
        let mut metrics = CacheMetrics::new(100, 10);
        metrics.record_set(40, true);
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_eviction(0);

        metrics.reset();

        assert_eq!(metrics.hits, 0);
        assert_eq!(metrics.misses, 0);
        assert_eq!(metrics.gets, 0);
        assert_eq!(metrics.sets, 0);
        assert_eq!(metrics.evictions, 0);
        assert_eq!(metrics.hit_rate, 0.0);
        assert_eq!(metrics.current_size, 40);
        assert_eq!(metrics.max_size, 100);
        assert_eq!(metrics.max_entries, 10);
    }

    #[test]
    fn test_recompute_gauges() {
        let now = Utc::now();
        let entries = vec![
            CacheEntry::new("a", json!("x"), 10, None, now),
            CacheEntry::new("b", json!("y"), -3, None, now),
            CacheEntry::new("c", json!("z"), 7, None, now),
        ];
        let mut metrics = CacheMetrics::default();
        metrics.recompute_gauges(&entries);

        assert_eq!(metrics.current_entries, 3);
        assert_eq!(metrics.current_size, 17);
    }

    #[test]
    fn test_performance_utilization() {
        let mut metrics = CacheMetrics::new(200, 4);
        metrics.record_set(50, true);
        metrics.record_set(50, true);

        let perf = metrics.performance();
        assert_eq!(perf.size_utilization, 50.0);
        assert_eq!(perf.entry_utilization, 50.0);
        assert_eq!(perf.average_entry_size, 50.0);
        assert_eq!(perf.total_operations, 2);
    }

    #[test]
    fn test_uptime_grows() {
        let mut metrics = CacheMetrics::default();
        metrics.started_at = Utc::now() - Duration::seconds(5);
        assert!(metrics.uptime() >= Duration::seconds(5));
    }
}
