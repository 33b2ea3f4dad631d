//! Bounded in-memory caches shared by the collector submodules.
//!
//! Caches are constructed once by the caller and injected, so their size is
//! configuration and tests can start from an empty or pre-filled state.

use lru::LruCache;
use parking_lot::RwLock;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Smallest capacity any cache is created with.
const MIN_CAPACITY: NonZeroUsize = NonZeroUsize::MIN;

fn capacity(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).unwrap_or(MIN_CAPACITY)
}

/// LRU cache behind a read/write lock.
///
/// Reads use `peek` under the read lock so lookups from concurrent prepare
/// tasks do not serialize on recency updates.
pub struct MetadataCache<K: Hash + Eq, V> {
    entries: RwLock<LruCache<K, V>>,
}

impl<K: Hash + Eq, V: Clone> MetadataCache<K, V> {
    /// Create a cache holding at most `size` entries.
    pub fn new(size: usize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity(size))),
        }
    }

    /// Cached value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.read().peek(key).cloned()
    }

    /// Insert or refresh `key`.
    pub fn insert(&self, key: K, value: V) {
        self.entries.write().put(key, value);
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Bounded set of addresses known not to be valid NFT collections or
/// objects. Lives for the process lifetime.
pub struct Blacklist {
    entries: RwLock<LruCache<String, ()>>,
}

impl Blacklist {
    /// Create a blacklist holding at most `size` addresses.
    pub fn new(size: usize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity(size))),
        }
    }

    /// Whether `addr` is blacklisted.
    pub fn contains(&self, addr: &str) -> bool {
        self.entries.read().contains(addr)
    }

    /// Blacklist `addr`.
    pub fn insert(&self, addr: impl Into<String>) {
        self.entries.write().put(addr.into(), ());
    }

    /// Number of blacklisted addresses.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is blacklisted.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_cache_evicts_oldest() {
        let cache: MetadataCache<String, u32> = MetadataCache::new(2);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        cache.insert("c".into(), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get(&"c".to_string()), Some(3));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache: MetadataCache<u8, u8> = MetadataCache::new(0);
        cache.insert(1, 1);
        assert_eq!(cache.get(&1), Some(1));
    }

    #[test]
    fn test_blacklist() {
        let blacklist = Blacklist::new(10);
        assert!(blacklist.is_empty());
        blacklist.insert("0xdead");
        assert!(blacklist.contains("0xdead"));
        assert!(!blacklist.contains("0xbeef"));
    }
}
