//! Result cache in front of the combination store.
//!
//! Entries are best-effort: a miss only costs a store read, so a poisoned
//! lock or an evicted entry never surfaces as an error.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use alchemy_core::Combination;
use lru::LruCache;

pub trait ResultCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Combination>;
    fn put(&self, row: Combination);
    fn invalidate(&self, keys: &[String]);
}

struct Entry {
    row: Combination,
    stored_at: Instant,
}

/// Bounded in-process LRU with a per-entry TTL.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, LruCache<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Combination> {
        let mut entries = self.entries();
        let fresh = entries
            .get(key)
            .map(|entry| entry.stored_at.elapsed() < self.ttl)?;
        if !fresh {
            entries.pop(key);
            return None;
        }
        entries.get(key).map(|entry| entry.row.clone())
    }

    fn put(&self, row: Combination) {
        let key = row.key.clone();
        self.entries().put(
            key,
            Entry {
                row,
                stored_at: Instant::now(),
            },
        );
    }

    fn invalidate(&self, keys: &[String]) {
        let mut entries = self.entries();
        for key in keys {
            entries.pop(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alchemy_core::Origin;

    fn steam() -> Combination {
        Combination::new("Water", "Fire", "Steam", "♨️", Origin::ModelGenerated, "t")
    }

    #[test]
    fn test_put_then_get() {
        let cache = MemoryCache::new(8, Duration::from_secs(60));
        assert!(cache.get("fire+water").is_none());
        cache.put(steam());
        assert_eq!(cache.get("fire+water").unwrap().result_name, "Steam");
    }

    #[test]
    fn test_invalidate() {
        let cache = MemoryCache::new(8, Duration::from_secs(60));
        cache.put(steam());
        cache.invalidate(&["fire+water".to_string(), "absent".to_string()]);
        assert!(cache.get("fire+water").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_miss() {
        let cache = MemoryCache::new(8, Duration::ZERO);
        cache.put(steam());
        assert!(cache.get("fire+water").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let cache = MemoryCache::new(1, Duration::from_secs(60));
        cache.put(steam());
        cache.put(Combination::new(
            "Earth",
            "Water",
            "Mud",
            "🟫",
            Origin::ModelGenerated,
            "t",
        ));
        assert!(cache.get("fire+water").is_none());
        assert!(cache.get("earth+water").is_some());
    }
}
