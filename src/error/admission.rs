use crate::chains::ChainIdentifier;
use thiserror::Error;

/// Errors related to wallet admission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// Every wallet is busy or underfunded.
    #[error("no available wallet on chain {0}")]
    NoAvailableWallet(ChainIdentifier),
}
