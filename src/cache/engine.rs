//! In-memory LRU cache with lazy TTL expiry and an optional weight budget.
//!
//! Recency is tracked by the [`lru`] crate's linked hash map, so promoting an
//! entry on read is O(1). Capacity is enforced after every [`LruCache::set`]:
//! first by total weight, then by entry count, always evicting from the
//! least-recently-used end.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{trace, warn};

/// Default entry-count cap.
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Default time-to-live (30 minutes).
pub const DEFAULT_TTL_MS: u64 = 30 * 60 * 1000;

/// Maps a stored value to its weight.
///
/// Negative, NaN and infinite results count as 0, and a panic inside the
/// weigher is caught and also counts as 0. Fractional weights are kept.
pub type Weigher<V> = Arc<dyn Fn(&V) -> f64 + Send + Sync>;

/// Construction parameters for [`LruCache`].
///
/// A zero in any field disables that bound.
///
/// # Examples
///
/// ```
/// use routeload::cache::CacheOptions;
///
/// let opts: CacheOptions = serde_json::from_str(r#"{ "max_entries": 60 }"#).unwrap();
/// assert_eq!(opts.max_entries, 60);
/// assert_eq!(opts.ttl_ms, 30 * 60 * 1000);
/// assert_eq!(opts.max_weight, 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Maximum number of entries; `0` means uncapped.
    pub max_entries: usize,
    /// Expiry window in milliseconds; `0` means entries never expire.
    pub ttl_ms: u64,
    /// Maximum total weight; `0` (or any non-positive value) means uncapped.
    pub max_weight: f64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl_ms: DEFAULT_TTL_MS,
            max_weight: 0.0,
        }
    }
}

impl CacheOptions {
    /// Options with no count cap, no expiry and no weight cap.
    pub fn unbounded() -> Self {
        Self {
            max_entries: 0,
            ttl_ms: 0,
            max_weight: 0.0,
        }
    }

    #[must_use]
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn max_weight(mut self, max_weight: f64) -> Self {
        self.max_weight = max_weight;
        self
    }

    fn ttl_duration(&self) -> Option<Duration> {
        (self.ttl_ms > 0).then(|| Duration::from_millis(self.ttl_ms))
    }
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    weight: f64,
}

struct Store<V> {
    entries: lru::LruCache<String, CacheEntry<V>>,
    total_weight: f64,
}

impl<V> Store<V> {
    fn remove(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.release(entry.weight);
                true
            }
            None => false,
        }
    }

    fn evict_lru(&mut self) {
        if let Some((key, entry)) = self.entries.pop_lru() {
            self.release(entry.weight);
            trace!(key = %key, weight = entry.weight, "evicted least-recently-used entry");
        }
    }

    // An empty store weighs exactly 0, whatever rounding the subtractions left.
    fn release(&mut self, weight: f64) {
        self.total_weight = if self.entries.is_empty() {
            0.0
        } else {
            (self.total_weight - weight).max(0.0)
        };
    }
}

/// A thread-safe LRU cache keyed by string.
///
/// Values are handed out by clone; store an `Arc` when values are large or
/// when callers need identity.
///
/// # Examples
///
/// ```
/// use routeload::cache::{CacheOptions, LruCache};
///
/// let cache = LruCache::new(CacheOptions::default().max_entries(2));
/// cache.set("a", 1);
/// cache.set("b", 2);
/// cache.get("a"); // "a" is now most recent
/// cache.set("c", 3); // evicts "b"
///
/// assert_eq!(cache.get("b"), None);
/// assert_eq!(cache.get("a"), Some(1));
/// assert_eq!(cache.size(), 2);
/// ```
pub struct LruCache<V> {
    store: Mutex<Store<V>>,
    options: CacheOptions,
    weigher: Option<Weigher<V>>,
}

impl<V: Clone> LruCache<V> {
    /// Creates an unweighted cache; weight-based eviction stays disabled.
    pub fn new(options: CacheOptions) -> Self {
        Self {
            store: Mutex::new(Store {
                entries: lru::LruCache::unbounded(),
                total_weight: 0.0,
            }),
            options,
            weigher: None,
        }
    }

    /// Creates a cache whose entries are weighed by `weigher`.
    pub fn with_weigher(options: CacheOptions, weigher: Weigher<V>) -> Self {
        Self {
            weigher: Some(weigher),
            ..Self::new(options)
        }
    }

    /// Returns the options this cache was built with.
    pub fn options(&self) -> CacheOptions {
        self.options
    }

    /// Looks up `key`, promoting it to most-recently-used on a hit.
    ///
    /// An expired entry is evicted and reported as absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut store = self.lock();
        let inserted_at = store.entries.peek(key)?.inserted_at;

        if self.is_expired(inserted_at) {
            store.remove(key);
            trace!(key = %key, "entry expired");
            return None;
        }

        store.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Inserts `value` as the most-recently-used entry, then enforces capacity.
    pub fn set(&self, key: &str, value: V) {
        let weight = self.weigh(&value);
        let mut store = self.lock();

        // Subtract the old weight before adding the new one.
        store.remove(key);
        store.entries.put(
            key.to_owned(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                weight,
            },
        );
        store.total_weight += weight;

        self.enforce_capacity(&mut store);
    }

    /// Removes `key` if present.
    pub fn delete(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Removes every entry and resets the total weight.
    pub fn clear(&self) {
        let mut store = self.lock();
        store.entries.clear();
        store.total_weight = 0.0;
    }

    /// Number of entries currently stored, expired ones included until read.
    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }

    /// Sum of the weights of all stored entries.
    pub fn weight(&self) -> f64 {
        self.lock().total_weight
    }

    /// Returns `true` if `key` is stored. Does not affect recency or expiry.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains(key)
    }

    /// Keys from least- to most-recently-used. Does not affect recency.
    pub fn keys(&self) -> Vec<String> {
        self.lock()
            .entries
            .iter()
            .rev()
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn enforce_capacity(&self, store: &mut Store<V>) {
        let max_weight = self.options.max_weight;
        while max_weight > 0.0 && store.total_weight > max_weight && !store.entries.is_empty() {
            store.evict_lru();
        }

        let max_entries = self.options.max_entries;
        while max_entries > 0 && store.entries.len() > max_entries {
            store.evict_lru();
        }
    }

    fn is_expired(&self, inserted_at: Instant) -> bool {
        self.options
            .ttl_duration()
            .is_some_and(|ttl| inserted_at.elapsed() > ttl)
    }

    fn weigh(&self, value: &V) -> f64 {
        let Some(weigher) = &self.weigher else {
            return 0.0;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| weigher(value))) {
            Ok(w) if w.is_finite() && w > 0.0 => w,
            Ok(_) => 0.0,
            Err(_) => {
                warn!("cache weigher panicked; counting entry weight as 0");
                0.0
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store<V>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone> Default for LruCache<V> {
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

impl<V> fmt::Debug for LruCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("LruCache")
            .field("options", &self.options)
            .field("size", &store.entries.len())
            .field("weight", &store.total_weight)
            .field("weighted", &self.weigher.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_len() -> Weigher<String> {
        Arc::new(|v: &String| v.len() as f64)
    }

    // ── Count-based eviction ─────────────────────────────────────────────────

    #[test]
    fn keeps_most_recent_entries_over_capacity() {
        let cache = LruCache::new(CacheOptions::default().max_entries(3));
        for i in 0..10 {
            cache.set(&format!("k{i}"), i);
        }
        assert_eq!(cache.size(), 3);
        assert_eq!(cache.keys(), vec!["k7", "k8", "k9"]);
    }

    #[test]
    fn get_promotes_entry() {
        let cache = LruCache::new(CacheOptions::default().max_entries(2));
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c", 3);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn contains_and_keys_do_not_promote() {
        let cache = LruCache::new(CacheOptions::default().max_entries(2));
        cache.set("a", 1);
        cache.set("b", 2);
        assert!(cache.contains("a"));
        let _ = cache.keys();
        cache.set("c", 3);
        assert!(!cache.contains("a"));
    }

    #[test]
    fn set_existing_key_refreshes_recency() {
        let cache = LruCache::new(CacheOptions::default().max_entries(2));
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 10);
        cache.set("c", 3);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn zero_max_entries_is_uncapped() {
        let cache = LruCache::new(CacheOptions::unbounded());
        for i in 0..500 {
            cache.set(&i.to_string(), i);
        }
        assert_eq!(cache.size(), 500);
    }

    // ── TTL ──────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn entry_alive_just_before_ttl() {
        let cache = LruCache::new(CacheOptions::default().ttl(Duration::from_millis(1000)));
        cache.set("a", 1);
        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(cache.get("a"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = LruCache::new(CacheOptions::default().ttl(Duration::from_millis(1000)));
        cache.set("a", 1);
        cache.set("b", 2);
        tokio::time::advance(Duration::from_millis(1001)).await;
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_lazy() {
        let cache = LruCache::new(CacheOptions::default().ttl(Duration::from_millis(10)));
        cache.set("a", 1);
        tokio::time::advance(Duration::from_secs(60)).await;
        // nothing swept until read
        assert!(cache.contains("a"));
        assert_eq!(cache.get("a"), None);
        assert!(!cache.contains("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_never_expires() {
        let cache = LruCache::new(CacheOptions::default().ttl(Duration::ZERO));
        cache.set("a", 1);
        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert_eq!(cache.get("a"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn reading_does_not_extend_ttl() {
        let cache = LruCache::new(CacheOptions::default().ttl(Duration::from_millis(100)));
        cache.set("a", 1);
        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(cache.get("a"), Some(1));
        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(cache.get("a"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_releases_weight() {
        let cache = LruCache::with_weigher(
            CacheOptions::default().ttl(Duration::from_millis(5)),
            by_len(),
        );
        cache.set("a", "abcd".to_owned());
        assert_eq!(cache.weight(), 4.0);
        tokio::time::advance(Duration::from_millis(6)).await;
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.weight(), 0.0);
    }

    // ── Weight ───────────────────────────────────────────────────────────────

    #[test]
    fn weight_tracks_sum_of_entries() {
        let cache = LruCache::with_weigher(CacheOptions::unbounded(), by_len());
        cache.set("a", "xx".to_owned());
        cache.set("b", "yyy".to_owned());
        assert_eq!(cache.weight(), 5.0);

        // overwrite must not double count
        cache.set("a", "zzzzzz".to_owned());
        assert_eq!(cache.weight(), 9.0);

        cache.delete("b");
        assert_eq!(cache.weight(), 6.0);

        cache.delete("missing");
        assert_eq!(cache.weight(), 6.0);

        cache.clear();
        assert_eq!(cache.weight(), 0.0);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn weight_cap_evicts_lru_first() {
        let cache =
            LruCache::with_weigher(CacheOptions::unbounded().max_weight(10.0), by_len());
        cache.set("a", "aaaa".to_owned());
        cache.set("b", "bbbb".to_owned());
        cache.get("a");
        cache.set("c", "cccc".to_owned());
        assert_eq!(cache.keys(), vec!["a", "c"]);
        assert_eq!(cache.weight(), 8.0);
    }

    #[test]
    fn oversized_entry_evicts_everything_including_itself() {
        let cache = LruCache::with_weigher(CacheOptions::unbounded().max_weight(3.0), by_len());
        cache.set("a", "a".to_owned());
        cache.set("big", "0123456789".to_owned());
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.weight(), 0.0);
    }

    #[test]
    fn weight_eviction_runs_before_count_eviction() {
        let cache = LruCache::with_weigher(
            CacheOptions::unbounded().max_weight(6.0).max_entries(2),
            by_len(),
        );
        cache.set("a", "aa".to_owned());
        cache.set("b", "bb".to_owned());
        cache.set("c", "cccc".to_owned());
        // weight 8 > 6 evicts "a"; then count is 2, nothing more to do
        assert_eq!(cache.keys(), vec!["b", "c"]);
        assert_eq!(cache.weight(), 6.0);
    }

    #[test]
    fn bad_weights_clamp_to_zero() {
        let weigher: Weigher<f64> = Arc::new(|v: &f64| *v);
        let cache = LruCache::with_weigher(CacheOptions::unbounded(), weigher);
        cache.set("neg", -5.0);
        cache.set("nan", f64::NAN);
        cache.set("inf", f64::INFINITY);
        cache.set("frac", 2.75);
        assert_eq!(cache.size(), 4);
        assert_eq!(cache.weight(), 2.75);
    }

    #[test]
    fn fractional_weights_sum_exactly() {
        let weigher: Weigher<f64> = Arc::new(|v: &f64| *v);
        let cache = LruCache::with_weigher(CacheOptions::unbounded(), weigher);
        cache.set("a", 0.5);
        cache.set("b", 0.25);
        cache.set("c", 1.125);
        assert_eq!(cache.weight(), 1.875);

        cache.set("b", 0.75);
        assert_eq!(cache.weight(), 2.375);

        cache.delete("a");
        assert_eq!(cache.weight(), 1.875);
    }

    #[test]
    fn sub_unit_weights_still_evict() {
        let weigher: Weigher<u32> = Arc::new(|_: &u32| 0.5);
        let cache = LruCache::with_weigher(CacheOptions::unbounded().max_weight(1.0), weigher);
        for i in 0..4 {
            cache.set(&format!("k{i}"), i);
        }
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.keys(), vec!["k2", "k3"]);
        assert_eq!(cache.weight(), 1.0);
    }

    #[test]
    fn emptied_cache_weighs_exactly_zero() {
        let weigher: Weigher<f64> = Arc::new(|v: &f64| *v);
        let cache = LruCache::with_weigher(CacheOptions::unbounded(), weigher);
        cache.set("a", 0.1);
        cache.set("b", 0.2);
        cache.delete("a");
        cache.delete("b");
        assert_eq!(cache.weight(), 0.0);
    }

    #[test]
    fn panicking_weigher_counts_as_zero() {
        let weigher: Weigher<u32> = Arc::new(|v: &u32| {
            if *v == 0 {
                panic!("cannot weigh zero");
            }
            f64::from(*v)
        });
        let cache = LruCache::with_weigher(CacheOptions::unbounded(), weigher);
        cache.set("ok", 7);
        cache.set("boom", 0);
        assert_eq!(cache.get("boom"), Some(0));
        assert_eq!(cache.weight(), 7.0);
    }

    #[test]
    fn weight_ignored_without_weigher() {
        let cache = LruCache::new(CacheOptions::unbounded().max_weight(1.0));
        cache.set("a", "long value".to_owned());
        cache.set("b", "another long value".to_owned());
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.weight(), 0.0);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: CacheOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, CacheOptions::default());
        let opts: CacheOptions =
            serde_json::from_str(r#"{"max_entries":0,"ttl_ms":1200000,"max_weight":1000000}"#)
                .unwrap();
        assert_eq!(opts.max_entries, 0);
        assert_eq!(opts.ttl_ms, 1_200_000);
        assert_eq!(opts.max_weight, 1_000_000.0);
    }
}
