//! Bounded caches with expiry, and keyed async gates.

use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// An LRU cache whose entries also expire after a fixed lifetime.
#[derive(Debug)]
pub struct TtlCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, (Instant, V)>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    /// Creates a cache holding at most `capacity` entries for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// A live entry, refreshing its recency. Expired entries are evicted.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some((stored, value)) if stored.elapsed() < self.ttl => return Some(value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    /// Inserts or replaces an entry.
    pub fn insert(&self, key: K, value: V) {
        self.entries.lock().put(key, (Instant::now(), value));
    }

    /// Removes an entry.
    pub fn remove(&self, key: &K) {
        self.entries.lock().pop(key);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One async mutex per key, created on demand.
///
/// Holding the guard of a key excludes other tasks of this process from
/// the same key. Idle keys are forgotten.
#[derive(Debug)]
pub struct KeyedLocks<K: Hash + Eq> {
    gates: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Hash + Eq + Clone> KeyedLocks<K> {
    /// Creates an empty set of gates.
    pub fn new() -> Self {
        Self {
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive use of `key`.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let gate = {
            let mut gates = self.gates.lock();
            gates.retain(|_, gate| Arc::strong_count(gate) > 1);
            Arc::clone(
                gates
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        gate.lock_owned().await
    }

    /// Number of keys currently held or awaited.
    pub fn active(&self) -> usize {
        self.gates
            .lock()
            .values()
            .filter(|gate| Arc::strong_count(gate) > 1)
            .count()
    }
}

impl<K: Hash + Eq + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire() {
        let cache = TtlCache::new(4, Duration::from_millis(20));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn least_recent_is_evicted() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.insert("c", 3);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn remove_and_clear() {
        let cache = TtlCache::new(0, Duration::from_secs(60));
        cache.insert(1, "x");
        cache.remove(&1);
        assert_eq!(cache.get(&1), None);
        cache.insert(2, "y");
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn keyed_locks_exclude_same_key_only() {
        let locks = KeyedLocks::new();
        let a = locks.lock(&"a").await;
        let b = locks.lock(&"b").await;
        assert_eq!(locks.active(), 2);

        let pending = tokio::time::timeout(Duration::from_millis(20), locks.lock(&"a")).await;
        assert!(pending.is_err());

        drop(a);
        drop(b);
        let again = locks.lock(&"a").await;
        assert_eq!(locks.active(), 1);
        drop(again);
        assert_eq!(locks.active(), 0);
    }
}
