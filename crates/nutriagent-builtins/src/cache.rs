//! Bounded in-memory cache for upstream lookups.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::trace;

/// Default number of cached lookups.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// A small capacity-bounded cache keyed by string.
///
/// Values are stored as JSON so heterogeneous lookup results can share one
/// cache. Serialization failures are swallowed: a cache that cannot store a
/// value behaves as a miss, never as an error.
pub struct LookupCache {
    entries: Mutex<HashMap<String, Value>>,
    capacity: usize,
}

impl LookupCache {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Fetch and deserialize a cached value.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entries = self.entries.lock();
        let value = entries.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => {
                trace!(%key, "cache hit");
                Some(v)
            }
            Err(_) => None,
        }
    }

    /// Store a value, evicting an arbitrary entry once at capacity.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        let Ok(json) = serde_json::to_value(value) else {
            return;
        };
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity && !entries.contains_key(key) {
            if let Some(evict) = entries.keys().next().cloned() {
                entries.remove(&evict);
            }
        }
        entries.insert(key.to_string(), json);
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for LookupCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cache = LookupCache::new(4);
        cache.put("search:apple", &vec!["a".to_string(), "b".to_string()]);
        let hit: Option<Vec<String>> = cache.get("search:apple");
        assert_eq!(hit, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_miss_on_absent_key() {
        let cache = LookupCache::new(4);
        let miss: Option<String> = cache.get("search:kale");
        assert!(miss.is_none());
    }

    #[test]
    fn test_capacity_is_enforced() {
        let cache = LookupCache::new(2);
        cache.put("a", &1u32);
        cache.put("b", &2u32);
        cache.put("c", &3u32);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_updating_an_existing_key_does_not_evict() {
        let cache = LookupCache::new(2);
        cache.put("a", &1u32);
        cache.put("b", &2u32);
        cache.put("a", &10u32);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get::<u32>("a"), Some(10));
        assert_eq!(cache.get::<u32>("b"), Some(2));
    }
}
