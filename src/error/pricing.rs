//! Pricing-specific error types.

use super::CacheError;
use crate::{chains::ChainIdentifier, config::EvmGasType};
use alloy::{primitives::Address, transports::TransportError};

/// Errors that can occur during gas estimation and fee calculation.
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    /// A price lookup failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Provider fee data lacks a field required by the configured gas model.
    #[error("fee data missing fields required by the {0} gas model")]
    MissingFeeData(EvmGasType),

    /// The redundant providers backing a chain could not agree on fee data.
    #[error("bad fee data: {0}")]
    BadFeeData(String),

    /// The fee cannot be expressed in the token without rounding it to an unusable value.
    #[error("precision underflow pricing token {token}: {reason}")]
    PrecisionUnderflow {
        /// The fee token.
        token: Address,
        /// What went wrong.
        reason: &'static str,
    },

    /// Token not configured on the chain.
    #[error("unsupported token {token} on chain {chain}")]
    UnsupportedToken {
        /// The chain.
        chain: ChainIdentifier,
        /// The token.
        token: Address,
    },

    /// Chain not configured.
    #[error("unsupported chain {0}")]
    UnsupportedChain(ChainIdentifier),

    /// The price source failed.
    #[error("price source unavailable: {0}")]
    PriceSource(String),

    /// Provider call failed.
    #[error(transparent)]
    Provider(#[from] TransportError),
}
