//! Token price sources and the poller feeding the token price cache.

use crate::{chains::ChainIdentifier, error::PricingError};
use alloy::primitives::{Address, map::HashMap};
use std::fmt;

mod fetchers;
pub use fetchers::*;

mod poller;
pub use poller::TokenPricePoller;

/// A token price as reported by a price source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenPrice {
    /// Price in the source's quote currency.
    pub price: f64,
    /// When the source last updated the price, in unix milliseconds.
    pub updated_at: u64,
}

/// A source of token prices.
#[async_trait::async_trait]
pub trait TokenPriceSource: Send + Sync + fmt::Debug {
    /// Fetches the prices of `tokens` on `chain`.
    ///
    /// Tokens the source does not know are left out of the result.
    async fn fetch(
        &self,
        chain: ChainIdentifier,
        tokens: &[Address],
    ) -> Result<HashMap<Address, TokenPrice>, PricingError>;
}
