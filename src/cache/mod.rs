//! Caches with read-time expiry.
//!
//! Entries are never evicted in the background. Every lookup is given the TTL of the caller's
//! chain and checks the entry age against it, so a lookup can never observe a stale value.

use crate::error::CacheError;
use dashmap::DashMap;
use std::{fmt, hash::Hash, time::Duration};
use tokio::time::Instant;
use tracing::trace;

mod balance;
pub use balance::GasBalanceCache;

mod metrics;
pub use metrics::CacheMetrics;

mod price;
pub use price::{FeeCacheId, PricePair, PriceSnapshot, TokenPriceCache};

/// A cached value together with the time it was produced.
#[derive(Debug, Clone)]
struct CachedEntry<V> {
    value: V,
    updated_at: Instant,
}

/// Thread-safe key-value store whose lookups enforce a caller supplied TTL.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CachedEntry<V>>,
    metrics: CacheMetrics,
}

impl<K: Eq + Hash, V> fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache").field("len", &self.entries.len()).finish_non_exhaustive()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + fmt::Debug,
    V: Clone,
{
    /// Creates an empty cache reporting metrics under `name`.
    pub fn new(name: &'static str) -> Self {
        Self { entries: DashMap::new(), metrics: CacheMetrics::new(name) }
    }

    /// Stores `value`, timestamped now.
    pub fn set(&self, key: K, value: V) {
        self.set_at(key, value, Instant::now());
    }

    /// Stores `value` with an explicit production time.
    pub fn set_at(&self, key: K, value: V, updated_at: Instant) {
        trace!(?key, "Caching value");
        self.entries.insert(key, CachedEntry { value, updated_at });
    }

    /// Returns the value if it is at most `ttl` old.
    pub fn get(&self, key: &K, ttl: Duration) -> Result<V, CacheError> {
        let Some(entry) = self.entries.get(key) else {
            self.metrics.record_miss();
            return Err(CacheError::Missing(format!("{key:?}")));
        };

        let age = Instant::now().saturating_duration_since(entry.updated_at);
        if age > ttl {
            self.metrics.record_expired();
            return Err(CacheError::Expired {
                key: format!("{key:?}"),
                lapsed_ms: (age - ttl).as_millis() as u64,
            });
        }

        self.metrics.record_hit();
        Ok(entry.value.clone())
    }

    /// Whether a value is cached under `key` and is at most `ttl` old.
    pub fn is_fresh(&self, key: &K, ttl: Duration) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| Instant::now().saturating_duration_since(entry.updated_at) <= ttl)
    }

    /// Removes the entry under `key`, returning its value.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Drops every entry older than `ttl`.
    pub fn evict_expired(&self, ttl: Duration) {
        let now = Instant::now();
        self.entries.retain(|_, entry| now.saturating_duration_since(entry.updated_at) <= ttl);
    }

    /// Clears every entry.
    pub fn reset(&self) {
        self.entries.clear();
        self.metrics.record_clear();
    }

    /// Number of entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
