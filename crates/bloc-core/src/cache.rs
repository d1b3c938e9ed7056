//! Time-boxed cache.
//!
//! Entries carry the timestamp they were inserted at and are considered
//! fresh for `ttl_ms`. Timestamps are host-supplied milliseconds
//! (`performance.now()` in a browser), so the cache never reads a clock.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: f64,
}

/// Key → value map whose entries expire after a fixed TTL.
///
/// Once the cache holds more than `max_entries`, inserts prune expired
/// entries and, if still over budget, the oldest ones.
#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    ttl_ms: f64,
    max_entries: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl_ms: f64, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_ms,
            max_entries,
        }
    }

    fn is_fresh(&self, entry: &Entry<V>, now_ms: f64) -> bool {
        now_ms - entry.inserted_at < self.ttl_ms
    }

    /// Fresh value for `key`, if any.
    pub fn get(&self, key: &K, now_ms: f64) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|e| self.is_fresh(e, now_ms))
            .map(|e| &e.value)
    }

    pub fn insert(&mut self, key: K, value: V, now_ms: f64) {
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now_ms,
            },
        );
        if self.entries.len() > self.max_entries {
            self.prune(now_ms);
        }
    }

    /// Return the cached value, or compute, store and return a new one.
    pub fn get_or_refresh(&mut self, key: K, now_ms: f64, refresh: impl FnOnce() -> V) -> V {
        if let Some(v) = self.get(&key, now_ms) {
            return v.clone();
        }
        let value = refresh();
        self.insert(key, value.clone(), now_ms);
        value
    }

    /// Drop one entry. Returns true if it was present.
    pub fn invalidate(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remove expired entries, then the oldest ones while over budget.
    pub fn prune(&mut self, now_ms: f64) {
        let ttl = self.ttl_ms;
        self.entries.retain(|_, e| now_ms - e.inserted_at < ttl);
        if self.entries.len() > self.max_entries {
            let mut by_age: Vec<(K, f64)> = self
                .entries
                .iter()
                .map(|(k, e)| (k.clone(), e.inserted_at))
                .collect();
            by_age.sort_by(|a, b| a.1.total_cmp(&b.1));
            let excess = self.entries.len() - self.max_entries;
            for (key, _) in by_age.into_iter().take(excess) {
                self.entries.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_ttl() {
        let mut cache = TtlCache::new(100.0, 10);
        cache.insert("a", 1, 0.0);
        assert_eq!(cache.get(&"a", 99.0), Some(&1));
        assert_eq!(cache.get(&"a", 100.0), None);
    }

    #[test]
    fn get_or_refresh_only_recomputes_stale_values() {
        let mut cache = TtlCache::new(200.0, 10);
        let mut calls = 0;
        for now in [0.0, 50.0, 199.0] {
            cache.get_or_refresh("zone", now, || {
                calls += 1;
                now
            });
        }
        assert_eq!(calls, 1);
        let v = cache.get_or_refresh("zone", 250.0, || {
            calls += 1;
            250.0
        });
        assert_eq!(calls, 2);
        assert_eq!(v, 250.0);
    }

    #[test]
    fn overflow_prunes_expired_then_oldest() {
        let mut cache = TtlCache::new(100.0, 3);
        cache.insert(1, "old", 0.0);
        cache.insert(2, "b", 150.0);
        cache.insert(3, "c", 160.0);
        cache.insert(4, "d", 170.0);
        // Entry 1 expired and went first
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&1, 170.0).is_none());

        cache.insert(5, "e", 180.0);
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&2, 180.0).is_none());
        assert_eq!(cache.get(&5, 180.0), Some(&"e"));
    }

    #[test]
    fn invalidate_is_idempotent() {
        let mut cache = TtlCache::new(100.0, 4);
        cache.insert("k", 1, 0.0);
        assert!(cache.invalidate(&"k"));
        assert!(!cache.invalidate(&"k"));
        assert!(cache.is_empty());
    }
}
