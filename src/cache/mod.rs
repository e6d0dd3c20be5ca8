//! Caching layer: the store interface and the in-memory LRU engine.
//!
//! [`CacheStore`] is the seam the loader talks to. Any type providing `get`
//! and `set` can be injected; the remaining operations have conservative
//! defaults so minimal caches still plug in. [`LruCache`] is the built-in
//! implementation with least-recently-used eviction, lazy TTL expiry and an
//! optional weight budget.

pub mod engine;

pub use engine::{CacheOptions, LruCache, Weigher};

/// The operations an injectable cache must expose.
///
/// `get` and `set` are required. Everything else defaults to a no-op or
/// `None`, meaning "this cache cannot report or do that".
pub trait CacheStore<V>: Send + Sync {
    /// Returns the value stored under `key`, if present and fresh.
    fn get(&self, key: &str) -> Option<V>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: V);

    /// Removes the entry under `key`, if any.
    fn delete(&self, _key: &str) {}

    /// Removes every entry.
    fn clear(&self) {}

    /// Number of stored entries, when the cache can report it.
    fn size(&self) -> Option<usize> {
        None
    }

    /// Total weight of stored entries, when the cache tracks weight.
    fn weight(&self) -> Option<f64> {
        None
    }

    /// Snapshot of stored keys, when the cache can enumerate them.
    fn keys(&self) -> Option<Vec<String>> {
        None
    }
}

impl<V: Clone + Send> CacheStore<V> for LruCache<V> {
    fn get(&self, key: &str) -> Option<V> {
        LruCache::get(self, key)
    }

    fn set(&self, key: &str, value: V) {
        LruCache::set(self, key, value);
    }

    fn delete(&self, key: &str) {
        LruCache::delete(self, key);
    }

    fn clear(&self) {
        LruCache::clear(self);
    }

    fn size(&self) -> Option<usize> {
        Some(LruCache::size(self))
    }

    fn weight(&self) -> Option<f64> {
        Some(LruCache::weight(self))
    }

    fn keys(&self) -> Option<Vec<String>> {
        Some(LruCache::keys(self))
    }
}
