//! Eviction Ordering Module
//!
//! Ranks entries as eviction victims for each [`EvictionPolicy`]. Ordering
//! comes from entry timestamps and counters, so no separate access list has
//! to be kept in sync with the map.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::cache::state::{CacheState, EvictionReason};
use crate::cache::CacheEntry;
use crate::config::EvictionPolicy;

// == Compare ==
/// Orders two entries so that the first eviction victim sorts first.
///
/// - LRU: oldest `accessed_at`
/// - LFU: lowest `access_count`, then oldest `accessed_at`
/// - FIFO: oldest `created_at`
/// - TTL: soonest `expires_at`, entries without expiry last
///
/// Ties fall back to the key so the order is deterministic.
pub fn compare(policy: EvictionPolicy, a: &CacheEntry, b: &CacheEntry) -> Ordering {
    let primary = match policy {
        EvictionPolicy::Lru => a.accessed_at.cmp(&b.accessed_at),
        EvictionPolicy::Lfu => a
            .access_count
            .cmp(&b.access_count)
            .then(a.accessed_at.cmp(&b.accessed_at)),
        EvictionPolicy::Fifo => a.created_at.cmp(&b.created_at),
        EvictionPolicy::Ttl => match (a.expires_at, b.expires_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    };
    primary.then_with(|| a.key.cmp(&b.key))
}

// == Eviction Order ==
/// Returns keys from first to last eviction victim.
pub fn eviction_order(entries: &HashMap<String, CacheEntry>, policy: EvictionPolicy) -> Vec<String> {
    let mut ranked: Vec<&CacheEntry> = entries.values().collect();
    ranked.sort_by(|a, b| compare(policy, a, b));
    ranked.into_iter().map(|entry| entry.key.clone()).collect()
}

// == Evict Until ==
/// Evicts victims in policy order until `done` holds or nothing is left.
///
/// Keys listed in `protected` are skipped. Returns the number evicted.
pub fn evict_until<F>(
    state: &mut CacheState,
    policy: EvictionPolicy,
    reason: EvictionReason,
    protected: &[&str],
    done: F,
) -> usize
where
    F: Fn(&CacheState) -> bool,
{
    let mut evicted = 0;
    for key in eviction_order(&state.entries, policy) {
        if done(&*state) {
            break;
        }
        if protected.contains(&key.as_str()) {
            continue;
        }
        if state.evict(&key, reason).is_some() {
            evicted += 1;
        }
    }
    evicted
}
