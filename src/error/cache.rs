use thiserror::Error;

/// Errors returned by cache lookups.
///
/// A lookup never degrades to stale data: an absent entry and an expired entry are reported
/// separately so callers can tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// No value is cached under the key.
    #[error("no cached value for {0}")]
    Missing(String),
    /// The cached value is older than the lookup TTL.
    #[error("cached value for {key} expired {lapsed_ms}ms ago")]
    Expired {
        /// Description of the key.
        key: String,
        /// How long ago the entry went stale, in milliseconds.
        lapsed_ms: u64,
    },
}

impl CacheError {
    /// Whether the entry was present but stale.
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }
}
