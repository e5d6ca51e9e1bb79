//! Content topics relayers and wallets talk on.

use crate::chains::NetworkChainId;

/// Topic shared by every chain.
pub const DEFAULT_CONTENT_TOPIC: &str = "/railgun/v1/default/json";

/// Topic fee broadcasts of `chain` are published on.
pub fn fees(chain: NetworkChainId) -> String {
    format!("/railgun/v1/{chain}/fees/json")
}

/// Topic relay requests for `chain` arrive on.
pub fn transact(chain: NetworkChainId) -> String {
    format!("/railgun/v1/{chain}/transact/json")
}

/// Topic relay results for `chain` are published on.
pub fn transact_response(chain: NetworkChainId) -> String {
    format!("/railgun/v1/{chain}/transact-response/json")
}

/// Whether messages on `content_topic` are fee broadcasts.
pub fn is_fees_topic(content_topic: &str) -> bool {
    content_topic.contains("fees")
}
