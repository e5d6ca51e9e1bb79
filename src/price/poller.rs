use super::TokenPriceSource;
use crate::{
    cache::{FeeCacheId, TokenPriceCache},
    chains::ChainIdentifier,
    config::RelayerConfig,
    error::{PricingError, RelayerError},
    periodic::{JobHandle, PeriodicJob, PeriodicTask},
};
use alloy::primitives::Address;
use futures_util::future::join_all;
use itertools::Itertools;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Periodically refreshes the [`TokenPriceCache`] from a [`TokenPriceSource`].
#[derive(Debug, Clone)]
pub struct TokenPricePoller {
    config: Arc<RelayerConfig>,
    cache: TokenPriceCache,
    source: Arc<dyn TokenPriceSource>,
}

impl TokenPricePoller {
    /// Creates a new poller.
    pub fn new(
        config: Arc<RelayerConfig>,
        cache: TokenPriceCache,
        source: Arc<dyn TokenPriceSource>,
    ) -> Self {
        Self { config, cache, source }
    }

    /// Fetches the prices of every configured token of `chain`, wrapped gas token included, and
    /// replaces the chain's price table.
    #[instrument(skip(self), fields(%chain))]
    pub async fn refresh_chain(&self, chain: ChainIdentifier) -> Result<FeeCacheId, PricingError> {
        let network = self.config.network(chain).ok_or(PricingError::UnsupportedChain(chain))?;
        let tokens = network
            .tokens
            .keys()
            .copied()
            .chain([network.gas_token.wrapped_address])
            .unique()
            .collect::<Vec<Address>>();

        let prices = self.source.fetch(chain, &tokens).await?;
        for token in tokens.iter().filter(|token| !prices.contains_key(*token)) {
            warn!(
                token = network.token_symbol(token),
                network = %network.name,
                "No price returned"
            );
        }

        let fee_cache_id = self.cache.replace_prices_for_chain(chain, prices);
        counter!("relayer_price_refreshes_total", "chain" => chain.to_string()).increment(1);
        Ok(fee_cache_id)
    }

    /// Refreshes every configured chain concurrently.
    ///
    /// A failing chain is logged and keeps its previous table.
    pub async fn refresh_all(&self) {
        let chains = self.config.chains().collect::<Vec<_>>();
        let results = join_all(chains.iter().map(|chain| self.refresh_chain(*chain))).await;
        for (chain, result) in chains.into_iter().zip(results) {
            match result {
                Ok(fee_cache_id) => debug!(%chain, %fee_cache_id, "Refreshed token prices"),
                Err(err) => warn!(%chain, %err, "Failed to refresh token prices"),
            }
        }
    }

    /// Launches the polling loop, refreshing every `price_refresh_delay`.
    pub fn spawn(self) -> JobHandle {
        let delay = self.config.token_prices.price_refresh_delay;
        info!(?delay, "Starting token price poller");
        PeriodicJob::launch(self, delay)
    }
}

impl PeriodicTask for TokenPricePoller {
    async fn run(&self) -> Result<(), RelayerError> {
        self.refresh_all().await;
        Ok(())
    }
}
