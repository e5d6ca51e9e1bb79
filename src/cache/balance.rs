//! Gas token balance cache with read-through refresh.

use super::TtlCache;
use crate::{
    chains::ChainIdentifier, config::RelayerConfig, error::RelayerError, provider::ChainProviders,
};
use alloy::primitives::{Address, U256};
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Per-chain, per-wallet gas token balances.
#[derive(Debug, Clone)]
pub struct GasBalanceCache {
    balances: Arc<TtlCache<(ChainIdentifier, Address), U256>>,
    providers: ChainProviders,
    config: Arc<RelayerConfig>,
}

impl GasBalanceCache {
    /// Creates an empty cache reading balances through `providers`.
    pub fn new(providers: ChainProviders, config: Arc<RelayerConfig>) -> Self {
        Self { balances: Arc::new(TtlCache::new("gas_balance")), providers, config }
    }

    /// Whether the balance of `address` is absent or older than the balance TTL.
    pub fn should_refresh(&self, chain: ChainIdentifier, address: Address) -> bool {
        !self.balances.is_fresh(&(chain, address), self.config.balances.gas_token_balance_cache_ttl)
    }

    /// Reads the balance of `address` from the chain and caches it.
    #[instrument(skip(self), fields(%chain, %address))]
    pub async fn refresh(
        &self,
        chain: ChainIdentifier,
        address: Address,
    ) -> Result<U256, RelayerError> {
        let provider = self.providers.get(chain).ok_or(RelayerError::UnsupportedChain(chain))?;
        let balance = provider.balance(address).await?;
        debug!(%balance, "Refreshed gas token balance");
        self.balances.set((chain, address), balance);
        Ok(balance)
    }

    /// Returns the balance of `address`, refreshing it first when it is stale.
    pub async fn get_balance(
        &self,
        chain: ChainIdentifier,
        address: Address,
    ) -> Result<U256, RelayerError> {
        if self.should_refresh(chain, address) {
            return self.refresh(chain, address).await;
        }
        Ok(self.balances.get(&(chain, address), self.config.balances.gas_token_balance_cache_ttl)?)
    }

    /// Refreshes the balances of `wallets` concurrently.
    ///
    /// A failing wallet is logged and keeps its previous entry; the others are still refreshed.
    pub async fn refresh_all(&self, chain: ChainIdentifier, wallets: &[Address]) {
        let results =
            join_all(wallets.iter().map(|address| self.refresh(chain, *address))).await;
        for (address, result) in wallets.iter().zip(results) {
            if let Err(err) = result {
                warn!(%chain, %address, %err, "Failed to refresh gas token balance");
            }
        }
    }

    /// Clears every cached balance.
    pub fn reset(&self) {
        self.balances.reset();
    }
}
