use std::time::Duration;
use thiserror::Error;

/// Errors returned by the Waku bridge client.
#[derive(Debug, Error)]
pub enum WakuError {
    /// The call did not complete in time.
    #[error("waku request timed out after {0:?}")]
    Timeout(Duration),
    /// Transport or HTTP status failure.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// The response did not carry the expected fields.
    #[error("malformed waku response: {0}")]
    Malformed(String),
    /// The bridge answered with an error payload.
    #[error("waku upstream error: {0}")]
    Upstream(String),
    /// A message payload was not valid base64.
    #[error("invalid message payload: {0}")]
    InvalidPayload(#[from] base64::DecodeError),
}
