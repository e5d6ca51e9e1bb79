//! Token price cache.
//!
//! Each refresh cycle replaces a chain's whole price table, so a token missing from the latest
//! cycle is unresolvable even if an earlier cycle priced it. Every replacement mints a new
//! [`FeeCacheId`] that quotes carry to detect they were derived from a superseded table.

use super::TtlCache;
use crate::{
    chains::ChainIdentifier, config::RelayerConfig, error::CacheError, price::TokenPrice,
};
use alloy::primitives::{Address, B256, map::HashMap};
use dashmap::DashMap;
use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Identifier of one generation of a chain's price table.
pub type FeeCacheId = B256;

/// The prices of a fee token and of the gas token, read from the same table generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePair {
    /// Price of the fee token.
    pub token_price: f64,
    /// Price of the wrapped gas token.
    pub gas_token_price: f64,
    /// Generation both prices were read from.
    pub fee_cache_id: FeeCacheId,
}

/// One generation of a chain's price table.
#[derive(Debug)]
struct PriceTable {
    id: FeeCacheId,
    prices: TtlCache<Address, f64>,
}

/// Per-chain token price tables.
#[derive(Debug, Clone)]
pub struct TokenPriceCache {
    tables: Arc<DashMap<ChainIdentifier, Arc<PriceTable>>>,
    config: Arc<RelayerConfig>,
}

impl TokenPriceCache {
    /// Creates an empty cache.
    pub fn new(config: Arc<RelayerConfig>) -> Self {
        Self { tables: Default::default(), config }
    }

    /// Replaces the whole price table of `chain` and returns the id of the new generation.
    pub fn replace_prices_for_chain(
        &self,
        chain: ChainIdentifier,
        prices: HashMap<Address, TokenPrice>,
    ) -> FeeCacheId {
        let id = FeeCacheId::from(rand::random::<[u8; 32]>());
        let table = PriceTable { id, prices: TtlCache::new("token_price") };
        debug!(%chain, fee_cache_id = %id, ?prices, "Replacing token prices");

        for (token, TokenPrice { price, updated_at }) in prices {
            match instant_from_unix_ms(updated_at) {
                Some(updated_at) => table.prices.set_at(token, price, updated_at),
                None => debug!(%chain, %token, updated_at, "Dropping price older than the clock"),
            }
        }

        self.tables.insert(chain, Arc::new(table));
        id
    }

    /// Returns the price of `token` on `chain`.
    pub fn lookup(&self, chain: ChainIdentifier, token: Address) -> Result<f64, CacheError> {
        self.snapshot(chain)
            .inspect_err(|err| self.warn_unavailable(chain, token, err))?
            .lookup(token)
    }

    /// Returns the prices of `token` and `gas_token` on `chain` from a single table generation.
    pub fn lookup_pair(
        &self,
        chain: ChainIdentifier,
        token: Address,
        gas_token: Address,
    ) -> Result<PricePair, CacheError> {
        self.snapshot(chain)
            .inspect_err(|err| self.warn_unavailable(chain, token, err))?
            .lookup_pair(token, gas_token)
    }

    /// Returns the current price table generation of `chain`.
    ///
    /// Lookups through the snapshot keep reading the same generation even if the table is
    /// replaced in the meantime.
    pub fn snapshot(&self, chain: ChainIdentifier) -> Result<PriceSnapshot<'_>, CacheError> {
        let table = self.tables.get(&chain).map(|table| Arc::clone(table.value()));
        let ttl = self.config.network(chain).map(|network| network.price_ttl);
        match (table, ttl) {
            (Some(table), Some(ttl)) => Ok(PriceSnapshot { cache: self, chain, table, ttl }),
            _ => Err(CacheError::Missing(format!("prices for chain {chain}"))),
        }
    }

    /// Returns the id of the current price generation of `chain`.
    pub fn fee_cache_id(&self, chain: ChainIdentifier) -> Option<FeeCacheId> {
        self.tables.get(&chain).map(|table| table.id)
    }

    /// Whether `id` is the current price generation of `chain`.
    pub fn is_current(&self, chain: ChainIdentifier, id: FeeCacheId) -> bool {
        self.fee_cache_id(chain) == Some(id)
    }

    /// Drops every price table.
    pub fn reset(&self) {
        self.tables.clear();
    }

    fn warn_unavailable(&self, chain: ChainIdentifier, token: Address, err: &CacheError) {
        let (symbol, network) = match self.config.network(chain) {
            Some(network) => (network.token_symbol(&token), network.name.clone()),
            None => (token.to_string(), chain.to_string()),
        };
        warn!(token = symbol, network, %err, "Token price unavailable");
    }
}

/// One generation of a chain's price table, pinned for a series of lookups.
#[derive(Debug)]
pub struct PriceSnapshot<'a> {
    cache: &'a TokenPriceCache,
    chain: ChainIdentifier,
    table: Arc<PriceTable>,
    ttl: Duration,
}

impl PriceSnapshot<'_> {
    /// Id of the pinned generation.
    pub fn id(&self) -> FeeCacheId {
        self.table.id
    }

    /// Returns the price of `token`.
    pub fn lookup(&self, token: Address) -> Result<f64, CacheError> {
        self.table
            .prices
            .get(&token, self.ttl)
            .inspect_err(|err| self.cache.warn_unavailable(self.chain, token, err))
    }

    /// Returns the prices of `token` and `gas_token`.
    pub fn lookup_pair(&self, token: Address, gas_token: Address) -> Result<PricePair, CacheError> {
        Ok(PricePair {
            token_price: self.lookup(token)?,
            gas_token_price: self.lookup(gas_token)?,
            fee_cache_id: self.id(),
        })
    }
}

/// Maps a unix timestamp onto the monotonic clock.
fn instant_from_unix_ms(updated_at: u64) -> Option<Instant> {
    let now_ms =
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
    Instant::now().checked_sub(Duration::from_millis(now_ms.saturating_sub(updated_at)))
}
