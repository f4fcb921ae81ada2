//! Bounded response store with dual budgets and layer-scoped invalidation.
//!
//! All mutable state lives in one `CacheState` behind one mutex: the LRU
//! map, the `layer -> keys` index, byte accounting, and the lifetime
//! counters move together, so every observer sees one consistent snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use super::CacheConfig;
use super::key::CacheKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

pub const METRIC_HIT: &str = "strato_cache_hit_total";
pub const METRIC_MISS: &str = "strato_cache_miss_total";
pub const METRIC_EVICT: &str = "strato_cache_evict_total";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache is disabled")]
    Disabled,
    #[error("payload of {size_bytes} bytes exceeds the cache memory budget of {limit_bytes} bytes")]
    PayloadTooLarge { size_bytes: u64, limit_bytes: u64 },
}

/// One stored response. Payloads are immutable once stored; a re-store
/// replaces the whole entry.
pub struct CacheEntry {
    pub payload: Bytes,
    pub size_bytes: u64,
    pub created_at: OffsetDateTime,
    pub last_access_at: OffsetDateTime,
    pub hit_count: u64,
}

/// Point-in-time view of the cache, taken under a single lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub item_count: usize,
    pub total_memory_bytes: u64,
    pub capacity: usize,
    pub memory_limit_bytes: u64,
    pub evictions: u64,
    pub hits: u64,
    pub misses: u64,
}

struct CacheState {
    /// Recency-ordered entries. The map is created unbounded; budgets are
    /// enforced by the explicit eviction loop so the byte budget and the
    /// secondary index stay in step with every removal.
    entries: LruCache<CacheKey, CacheEntry>,
    by_layer: HashMap<String, HashSet<CacheKey>>,
    total_bytes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn evict_over_budget(&mut self, max_items: usize, max_bytes: u64) {
        while self.entries.len() > max_items || self.total_bytes > max_bytes {
            let Some((key, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
            self.evictions += 1;
            self.unindex(&key);
            counter!(METRIC_EVICT).increment(1);
            debug!(key = %key, size_bytes = entry.size_bytes, "evicted cache entry");
        }
    }

    fn unindex(&mut self, key: &CacheKey) {
        if let Some(keys) = self.by_layer.get_mut(key.layer()) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_layer.remove(key.layer());
            }
        }
    }
}

/// Response cache bounded by an entry count and a memory budget.
///
/// Eviction is synchronous: `put` returns only once both budgets hold, so
/// the cache is never observably over budget between calls.
pub struct TileCache {
    enabled: bool,
    max_items: usize,
    max_bytes: u64,
    state: Mutex<CacheState>,
}

impl TileCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_items: config.max_items,
            max_bytes: config.max_bytes(),
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                by_layer: HashMap::new(),
                total_bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Looks up a stored payload. A hit refreshes recency and per-entry
    /// accounting; a disabled cache answers a definitive miss without
    /// touching any counter.
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        if !self.enabled {
            return None;
        }
        let mut guard = mutex_lock(&self.state, SOURCE, "get");
        let state = &mut *guard;
        if let Some(entry) = state.entries.get_mut(key) {
            entry.last_access_at = OffsetDateTime::now_utc();
            entry.hit_count += 1;
            let payload = entry.payload.clone();
            state.hits += 1;
            counter!(METRIC_HIT).increment(1);
            return Some(payload);
        }
        state.misses += 1;
        counter!(METRIC_MISS).increment(1);
        None
    }

    /// Stores or wholesale-replaces a payload, then evicts until both
    /// budgets hold. Payloads that could never fit are rejected outright
    /// instead of flushing the rest of the cache to no effect.
    pub fn put(&self, key: CacheKey, payload: Bytes) -> Result<(), CacheError> {
        if !self.enabled {
            return Err(CacheError::Disabled);
        }
        let size_bytes = payload.len() as u64;
        if size_bytes > self.max_bytes {
            return Err(CacheError::PayloadTooLarge {
                size_bytes,
                limit_bytes: self.max_bytes,
            });
        }

        let now = OffsetDateTime::now_utc();
        let entry = CacheEntry {
            payload,
            size_bytes,
            created_at: now,
            last_access_at: now,
            hit_count: 0,
        };

        let mut guard = mutex_lock(&self.state, SOURCE, "put");
        let state = &mut *guard;
        if let Some(previous) = state.entries.put(key.clone(), entry) {
            state.total_bytes = state.total_bytes.saturating_sub(previous.size_bytes);
        } else {
            state
                .by_layer
                .entry(key.layer().to_string())
                .or_default()
                .insert(key);
        }
        state.total_bytes += size_bytes;
        state.evict_over_budget(self.max_items, self.max_bytes);
        Ok(())
    }

    /// Drops every entry and zeroes item/byte accounting. Lifetime hit,
    /// miss, and eviction counters are left untouched. Returns the number
    /// of entries removed.
    pub fn clear(&self) -> usize {
        let mut guard = mutex_lock(&self.state, SOURCE, "clear");
        let state = &mut *guard;
        let removed = state.entries.len();
        state.entries.clear();
        state.by_layer.clear();
        state.total_bytes = 0;
        removed
    }

    /// Drops exactly the entries stored under `layer`. Recency and hit
    /// counts of surviving entries are not disturbed.
    pub fn clear_layer(&self, layer: &str) -> usize {
        let mut guard = mutex_lock(&self.state, SOURCE, "clear_layer");
        let state = &mut *guard;
        let Some(keys) = state.by_layer.remove(layer) else {
            return 0;
        };
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = state.entries.pop(&key) {
                state.total_bytes = state.total_bytes.saturating_sub(entry.size_bytes);
                removed += 1;
            }
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let guard = mutex_lock(&self.state, SOURCE, "stats");
        CacheStats {
            item_count: guard.entries.len(),
            total_memory_bytes: guard.total_bytes,
            capacity: self.max_items,
            memory_limit_bytes: self.max_bytes,
            evictions: guard.evictions,
            hits: guard.hits,
            misses: guard.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::super::key::OutputFormat;
    use super::*;

    fn cache_with(max_items: usize, max_memory_mb: u64) -> TileCache {
        TileCache::new(CacheConfig {
            enabled: true,
            max_items,
            max_memory_mb,
        })
    }

    fn tile(layer: &str, z: u8, x: u32, y: u32) -> CacheKey {
        CacheKey::tile(layer, z, x, y, OutputFormat::Mvt)
    }

    fn payload(len: usize) -> Bytes {
        Bytes::from(vec![0xABu8; len])
    }

    #[test]
    fn miss_then_hit() {
        let cache = cache_with(10, 1);
        let key = tile("roads", 1, 0, 0);

        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), Bytes::from_static(b"tile")).unwrap();
        assert_eq!(cache.get(&key).unwrap(), Bytes::from_static(b"tile"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.item_count, 1);
        assert_eq!(stats.total_memory_bytes, 4);
    }

    #[test]
    fn lru_eviction_prefers_least_recently_used() {
        let cache = cache_with(2, 1);
        let k1 = tile("roads", 1, 0, 0);
        let k2 = tile("roads", 1, 0, 1);
        let k3 = tile("roads", 1, 1, 0);

        cache.put(k1.clone(), payload(8)).unwrap();
        cache.put(k2.clone(), payload(8)).unwrap();
        assert!(cache.get(&k1).is_some());
        cache.put(k3.clone(), payload(8)).unwrap();

        assert!(cache.get(&k2).is_none(), "k2 was least recently used");
        assert!(cache.get(&k1).is_some());
        assert!(cache.get(&k3).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn memory_budget_is_enforced_after_put() {
        let cache = cache_with(100, 1);
        let chunk = 400 * 1024;

        cache.put(tile("a", 0, 0, 0), payload(chunk)).unwrap();
        cache.put(tile("a", 0, 0, 1), payload(chunk)).unwrap();
        cache.put(tile("a", 0, 0, 2), payload(chunk)).unwrap();

        let stats = cache.stats();
        assert!(stats.total_memory_bytes <= stats.memory_limit_bytes);
        assert_eq!(stats.item_count, 2);
        assert_eq!(stats.evictions, 1);
        assert!(cache.get(&tile("a", 0, 0, 0)).is_none());
    }

    #[test]
    fn oversized_payload_is_rejected_without_thrash() {
        let cache = cache_with(10, 1);
        cache.put(tile("a", 0, 0, 0), payload(16)).unwrap();

        let err = cache
            .put(tile("a", 0, 0, 1), payload(2 * 1024 * 1024))
            .unwrap_err();
        assert!(matches!(err, CacheError::PayloadTooLarge { .. }));

        let stats = cache.stats();
        assert_eq!(stats.item_count, 1, "existing entries must survive");
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn replacement_is_wholesale() {
        let cache = cache_with(10, 1);
        let key = tile("roads", 1, 0, 0);

        cache.put(key.clone(), payload(100)).unwrap();
        cache.put(key.clone(), payload(40)).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.item_count, 1);
        assert_eq!(stats.total_memory_bytes, 40);
        assert_eq!(cache.get(&key).unwrap().len(), 40);
    }

    #[test]
    fn clear_layer_removes_exactly_that_layer() {
        let cache = cache_with(10, 1);
        cache.put(tile("roads", 1, 0, 0), payload(8)).unwrap();
        cache.put(tile("roads", 1, 0, 1), payload(8)).unwrap();
        cache.put(tile("rivers", 1, 0, 0), payload(8)).unwrap();

        assert_eq!(cache.clear_layer("roads"), 2);
        assert_eq!(cache.clear_layer("roads"), 0);

        let stats = cache.stats();
        assert_eq!(stats.item_count, 1);
        assert_eq!(stats.total_memory_bytes, 8);
        assert!(cache.get(&tile("rivers", 1, 0, 0)).is_some());
    }

    #[test]
    fn clear_preserves_lifetime_counters() {
        let cache = cache_with(1, 1);
        let k1 = tile("a", 0, 0, 0);
        let k2 = tile("a", 0, 0, 1);

        cache.put(k1.clone(), payload(8)).unwrap();
        cache.get(&k1);
        cache.get(&k2);
        cache.put(k2, payload(8)).unwrap();

        assert_eq!(cache.clear(), 1);

        let stats = cache.stats();
        assert_eq!(stats.item_count, 0);
        assert_eq!(stats.total_memory_bytes, 0);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[test]
    fn disabled_cache_rejects_writes_and_never_hits() {
        let cache = TileCache::new(CacheConfig {
            enabled: false,
            max_items: 10,
            max_memory_mb: 1,
        });
        let key = tile("roads", 1, 0, 0);

        assert_eq!(cache.put(key.clone(), payload(8)), Err(CacheError::Disabled));
        assert!(cache.get(&key).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0, "disabled lookups must not count");
    }

    #[test]
    fn recovers_from_poisoned_state_lock() {
        let cache = cache_with(10, 1);
        cache.put(tile("roads", 1, 0, 0), payload(8)).unwrap();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache.state.lock().expect("state lock");
            panic!("poison cache state");
        }));

        assert_eq!(cache.stats().item_count, 1);
        assert!(cache.get(&tile("roads", 1, 0, 0)).is_some());
    }
}
