//! Cache State Module
//!
//! The entry map and its metrics, kept together so that every mutation
//! updates both in one step. Listener events raised by a mutation are
//! journaled here and drained by the store once its lock is released.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::cache::{CacheEntry, CacheMetrics};

// == Eviction Reason ==
/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionReason {
    /// TTL elapsed
    Expired,
    /// Explicit delete
    Manual,
    /// Entry or size ceiling breached on write
    Capacity,
    /// Size-targeted cleanup
    Size,
    /// Age-based cleanup
    Age,
    /// Idle-based cleanup
    Unused,
    /// Dropped by repair as unrepairable
    Corrupted,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionReason::Expired => "expired",
            EvictionReason::Manual => "manual",
            EvictionReason::Capacity => "capacity",
            EvictionReason::Size => "size",
            EvictionReason::Age => "age",
            EvictionReason::Unused => "unused",
            EvictionReason::Corrupted => "corrupted",
        };
        f.write_str(name)
    }
}

// == Cache Event ==
/// A listener notification waiting for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Hit(String),
    Miss(String),
    Eviction(String, EvictionReason),
}

// == Cache State ==
/// Entry map plus metrics.
#[derive(Debug, Clone, Default)]
pub struct CacheState {
    pub entries: HashMap<String, CacheEntry>,
    pub metrics: CacheMetrics,
    events: Vec<CacheEvent>,
}

impl CacheState {
    // == Constructor ==
    pub fn new(metrics: CacheMetrics) -> Self {
        Self {
            entries: HashMap::new(),
            metrics,
            events: Vec::new(),
        }
    }

    /// Builds a state from restored parts; gauges are recomputed from the
    /// entries so the size invariant holds regardless of the input metrics.
    pub fn from_parts(entries: HashMap<String, CacheEntry>, mut metrics: CacheMetrics) -> Self {
        metrics.recompute_gauges(entries.values());
        Self {
            entries,
            metrics,
            events: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Insert ==
    /// Inserts or overwrites an entry, returning the replaced one.
    pub fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        let new_size = entry.accounted_size();
        let previous = self.entries.insert(entry.key.clone(), entry);
        let old_size = previous.as_ref().map_or(0, CacheEntry::accounted_size);
        self.metrics
            .record_set(new_size - old_size, previous.is_none());
        previous
    }

    // == Evict ==
    /// Removes an entry and journals an eviction event.
    ///
    /// `Manual` removals count as deletes, every other reason as evictions.
    pub fn evict(&mut self, key: &str, reason: EvictionReason) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        match reason {
            EvictionReason::Manual => self.metrics.record_delete(entry.accounted_size()),
            _ => self.metrics.record_eviction(entry.accounted_size()),
        }
        self.events
            .push(CacheEvent::Eviction(key.to_string(), reason));
        Some(entry)
    }

    /// Evicts every entry matching `predicate`, returning how many left.
    pub fn evict_where<F>(&mut self, reason: EvictionReason, predicate: F) -> usize
    where
        F: Fn(&CacheEntry) -> bool,
    {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| predicate(entry))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        for key in &doomed {
            if self.evict(key, reason).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn record_hit(&mut self, key: &str) {
        self.metrics.record_hit();
        self.events.push(CacheEvent::Hit(key.to_string()));
    }

    pub fn record_miss(&mut self, key: &str) {
        self.metrics.record_miss();
        self.events.push(CacheEvent::Miss(key.to_string()));
    }

    /// Journals an eviction for an entry removed outside of [`Self::evict`].
    pub fn push_event(&mut self, event: CacheEvent) {
        self.events.push(event);
    }

    /// Drains journaled events for dispatch.
    pub fn take_events(&mut self) -> Vec<CacheEvent> {
        std::mem::take(&mut self.events)
    }

    /// Sum of accounted entry sizes.
    pub fn total_size(&self) -> i64 {
        self.entries
            .values()
            .map(CacheEntry::accounted_size)
            .fold(0i64, i64::saturating_add)
    }

    /// True when the gauges match the entry map.
    pub fn is_consistent(&self) -> bool {
        self.metrics.current_entries == self.entries.len()
            && self.metrics.current_size == self.total_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn entry(key: &str, size: i64) -> CacheEntry {
        CacheEntry::new(key, json!(key), size, None, Utc::now())
    }

    #[test]
    fn test_insert_and_overwrite_keep_gauges_consistent() {
        let mut state = CacheState::default();
        assert!(state.insert(entry("a", 10)).is_none());
        assert!(state.insert(entry("b", 20)).is_none());
        assert!(state.insert(entry("a", 4)).is_some());

        assert_eq!(state.len(), 2);
        assert_eq!(state.metrics.current_size, 24);
        assert_eq!(state.metrics.sets, 3);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_evict_manual_counts_delete() {
        let mut state = CacheState::default();
        state.insert(entry("a", 10));

        assert!(state.evict("a", EvictionReason::Manual).is_some());
        assert_eq!(state.metrics.deletes, 1);
        assert_eq!(state.metrics.evictions, 0);
        assert!(state.is_consistent());
        assert_eq!(
            state.take_events(),
            vec![CacheEvent::Eviction("a".into(), EvictionReason::Manual)]
        );
        assert!(state.take_events().is_empty());
    }

    #[test]
    fn test_evict_missing_is_none() {
        let mut state = CacheState::default();
        assert!(state.evict("ghost", EvictionReason::Expired).is_none());
        assert!(state.take_events().is_empty());
    }

    #[test]
    fn test_evict_where() {
        let mut state = CacheState::default();
        for (key, size) in [("a", 1), ("b", 50), ("c", 60)] {
            state.insert(entry(key, size));
        }

        let removed = state.evict_where(EvictionReason::Size, |e| e.size > 10);
        assert_eq!(removed, 2);
        assert_eq!(state.metrics.evictions, 2);
        assert!(state.entries.contains_key("a"));
        assert!(state.is_consistent());
    }

    #[test]
    fn test_from_parts_recomputes_gauges() {
        let mut entries = HashMap::new();
        entries.insert("a".to_string(), entry("a", 10));
        entries.insert("b".to_string(), entry("b", 5));
        let stale = CacheMetrics {
            current_size: 999,
            current_entries: 42,
            hits: 7,
            ..CacheMetrics::default()
        };

        let state = CacheState::from_parts(entries, stale);
        assert!(state.is_consistent());
        assert_eq!(state.metrics.hits, 7);
    }
}
