//! Cache metrics.

use metrics::counter;

/// Cache metrics collector, labelled with the name of the cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheMetrics {
    cache_name: &'static str,
}

impl CacheMetrics {
    /// Create a new metrics collector for a cache.
    pub const fn new(cache_name: &'static str) -> Self {
        Self { cache_name }
    }

    /// Record a lookup that returned a fresh value.
    pub fn record_hit(&self) {
        counter!("relayer_cache_hits_total", "cache" => self.cache_name).increment(1);
    }

    /// Record a lookup for an absent key.
    pub fn record_miss(&self) {
        counter!("relayer_cache_misses_total", "cache" => self.cache_name).increment(1);
    }

    /// Record a lookup that found a stale value.
    pub fn record_expired(&self) {
        counter!("relayer_cache_expired_total", "cache" => self.cache_name).increment(1);
    }

    /// Record a full clear.
    pub fn record_clear(&self) {
        counter!("relayer_cache_clears_total", "cache" => self.cache_name).increment(1);
    }
}
