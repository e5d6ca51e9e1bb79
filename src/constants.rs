//! Relayer constants.

use std::time::Duration;

/// Default number of wallets derived from the mnemonic.
pub const DEFAULT_NUM_WALLETS: usize = 1;

/// Numerator of the gas limit margin applied on top of a gas estimate (120%).
pub const GAS_LIMIT_MARGIN_BPS: u64 = 12_000;

/// Basis points denominator.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Number of decimal places kept by the gas token to fee token conversion rate.
pub const FEE_RATE_DECIMALS: u8 = 8;

/// Largest float magnitude that still maps to an exact integer.
///
/// Scaled rates above this bound lose their low digits when converted to an integer.
pub const MAX_EXACT_FLOAT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Number of retries after the first attempt of a request to the Waku bridge.
pub const WAKU_MAX_RETRIES: u32 = 4;

/// Timeout of a single call to the Waku bridge.
pub const WAKU_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall timeout of the HTTP client used for the Waku bridge.
pub const WAKU_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// The default pubsub topic relayers publish to.
pub const DEFAULT_PUBSUB_TOPIC: &str = "/waku/2/default-waku/proto";

/// How long a token price is usable after the source reported it.
pub const DEFAULT_PRICE_TTL: Duration = Duration::from_secs(5 * 60);

/// How long a cached wallet balance is usable.
pub const DEFAULT_BALANCE_TTL: Duration = Duration::from_secs(10 * 60);

/// Delay between two token price refresh cycles.
pub const DEFAULT_PRICE_REFRESH_DELAY: Duration = Duration::from_secs(30);

/// How long a broadcast set of fees stays valid for clients.
pub const DEFAULT_FEE_EXPIRATION: Duration = Duration::from_secs(5 * 60);

/// Interval between two fee broadcasts.
pub const DEFAULT_FEE_BROADCAST_INTERVAL: Duration = Duration::from_secs(15);

/// Largest number of decimals a gas token or fee token may declare.
///
/// Keeps every power of ten used in fee math well inside 256 bits.
pub const MAX_TOKEN_DECIMALS: u8 = 36;

/// Default decimals of a gas token.
pub const DEFAULT_GAS_TOKEN_DECIMALS: u8 = 18;

/// Interval between two polls for incoming relay requests.
pub const TRANSACT_POLL_INTERVAL: Duration = Duration::from_secs(1);
