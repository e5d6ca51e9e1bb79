//! Relayer error types.
use crate::chains::ChainIdentifier;
use alloy::{primitives::U256, transports::TransportError};
use thiserror::Error;

mod admission;
pub use admission::AdmissionError;

mod cache;
pub use cache::CacheError;

mod pricing;
pub use pricing::PricingError;

mod waku;
pub use waku::WakuError;

/// The overarching error type returned by relay operations.
#[derive(Debug, Error)]
pub enum RelayerError {
    /// Errors related to cache lookups.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// Errors related to gas estimation and fee pricing.
    #[error(transparent)]
    Pricing(#[from] PricingError),
    /// Errors related to the Waku bridge.
    #[error(transparent)]
    Waku(#[from] WakuError),
    /// Errors related to wallet admission.
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    /// The chain is not configured.
    #[error("unsupported chain {0}")]
    UnsupportedChain(ChainIdentifier),
    /// The fee quote was derived from a price generation that has since been replaced.
    #[error("fee quote is stale on chain {0}")]
    StaleFeeQuote(ChainIdentifier),
    /// The fee offered by the client does not cover the required fee.
    #[error("fee too low, required {required}, offered {offered}")]
    FeeTooLow {
        /// The fee the relayer requires.
        required: U256,
        /// The fee the client offered.
        offered: U256,
    },
    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// An error occurred talking to RPC.
    #[error(transparent)]
    RpcError(#[from] TransportError),
    /// An internal error occurred.
    #[error(transparent)]
    InternalError(#[from] eyre::Error),
}

impl From<RelayerError> for String {
    fn from(err: RelayerError) -> Self {
        err.to_string()
    }
}
