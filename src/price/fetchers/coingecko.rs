use crate::{
    chains::{ChainIdentifier, NetworkChainId},
    error::PricingError,
    price::{TokenPrice, TokenPriceSource},
};
use alloy::primitives::{Address, map::HashMap};
use itertools::Itertools;
use serde::Deserialize;
use std::{str::FromStr, time::Duration};
use tracing::{trace, warn};
use url::Url;

/// Timeout of a single price request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// A single token entry of a `simple/token_price` response.
#[derive(Debug, Deserialize)]
struct TokenPriceEntry {
    usd: Option<f64>,
    /// Unix seconds.
    last_updated_at: Option<u64>,
}

/// CoinGecko price fetcher.
#[derive(Debug, Clone)]
pub struct CoinGecko {
    client: reqwest::Client,
    /// Base API URL, ending with a slash.
    api_url: Url,
    api_key: Option<String>,
}

impl CoinGecko {
    /// Creates a new fetcher against the given API.
    pub fn new(api_url: Url, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, api_url, api_key }
    }

    /// Returns the CoinGecko asset platform of a network.
    fn platform(chain: NetworkChainId) -> Option<&'static str> {
        match chain {
            NetworkChainId::Ethereum => Some("ethereum"),
            NetworkChainId::BnbChain => Some("binance-smart-chain"),
            NetworkChainId::PolygonPos => Some("polygon-pos"),
            NetworkChainId::EthereumGoerli
            | NetworkChainId::Hardhat
            | NetworkChainId::PolygonMumbai
            | NetworkChainId::ArbitrumGoerli => None,
        }
    }
}

#[async_trait::async_trait]
impl TokenPriceSource for CoinGecko {
    async fn fetch(
        &self,
        chain: ChainIdentifier,
        tokens: &[Address],
    ) -> Result<HashMap<Address, TokenPrice>, PricingError> {
        let platform = Self::platform(chain.id).ok_or(PricingError::UnsupportedChain(chain))?;

        let mut url = self
            .api_url
            .join(&format!("simple/token_price/{platform}"))
            .map_err(|err| PricingError::PriceSource(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("contract_addresses", &tokens.iter().join(","))
            .append_pair("vs_currencies", "usd")
            .append_pair("include_last_updated_at", "true");
        if let Some(api_key) = &self.api_key {
            url.query_pairs_mut().append_pair("x_cg_demo_api_key", api_key);
        }

        let response = async {
            self.client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json::<HashMap<String, TokenPriceEntry>>()
                .await
        }
        .await
        .map_err(|err| PricingError::PriceSource(err.to_string()))?;

        trace!(?response, %chain, "CoinGecko response.");

        Ok(response
            .into_iter()
            .filter_map(|(address, entry)| {
                let Ok(address) = Address::from_str(&address) else {
                    warn!(address, "CoinGecko returned an invalid token address.");
                    return None;
                };
                let price = entry.usd.filter(|price| price.is_finite() && *price > 0.0)?;
                let updated_at = entry.last_updated_at?.saturating_mul(1000);
                Some((address, TokenPrice { price, updated_at }))
            })
            .collect())
    }
}
