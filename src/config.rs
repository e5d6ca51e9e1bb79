//! Relayer configuration.
use crate::{
    chains::{ChainIdentifier, ChainType, NetworkChainId},
    constants::{
        DEFAULT_BALANCE_TTL, DEFAULT_FEE_BROADCAST_INTERVAL, DEFAULT_FEE_EXPIRATION,
        DEFAULT_GAS_TOKEN_DECIMALS, DEFAULT_NUM_WALLETS, DEFAULT_PRICE_REFRESH_DELAY,
        DEFAULT_PRICE_TTL, DEFAULT_PUBSUB_TOPIC, MAX_TOKEN_DECIMALS, WAKU_CLIENT_TIMEOUT,
        WAKU_REQUEST_TIMEOUT,
    },
};
use alloy::{
    primitives::{Address, U256, map::HashMap},
    signers::local::coins_bip39::{English, Mnemonic},
};
use eyre::{Context, OptionExt, bail, ensure};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, time::Duration};
use url::Url;

/// Relayer configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    /// Network configurations.
    #[serde(with = "crate::serde::hash_map")]
    pub networks: HashMap<NetworkChainId, NetworkConfig>,
    /// Gas token balance cache configuration.
    #[serde(default)]
    pub balances: BalanceConfig,
    /// Token price polling configuration.
    #[serde(default)]
    pub token_prices: TokenPriceConfig,
    /// Waku bridge configuration.
    #[serde(default)]
    pub waku: WakuConfig,
    /// Fee broadcast configuration.
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    /// Relayer wallet configuration.
    #[serde(default)]
    pub wallets: WalletConfig,
    /// Secrets.
    #[serde(skip)]
    pub secrets: SecretsConfig,
}

impl RelayerConfig {
    /// Adds or replaces the configuration of a network.
    pub fn with_network(mut self, chain: NetworkChainId, network: NetworkConfig) -> Self {
        self.networks.insert(chain, network);
        self
    }

    /// Sets the primary and backup Waku bridge URLs.
    pub fn with_waku_urls(mut self, url: Option<Url>, url_backup: Option<Url>) -> Self {
        if let Some(url) = url {
            self.waku.url = url;
        }
        if let Some(url_backup) = url_backup {
            self.waku.url_backup = url_backup;
        }
        self
    }

    /// Sets the number of wallets derived from the mnemonic.
    pub fn with_num_wallets(mut self, num_wallets: Option<usize>) -> Self {
        self.wallets.num_wallets = num_wallets.unwrap_or(self.wallets.num_wallets);
        self
    }

    /// Sets the mnemonic wallets are derived from.
    pub fn with_wallets_mnemonic(mut self, mnemonic: Mnemonic<English>) -> Self {
        self.secrets.wallets_mnemonic = Some(mnemonic);
        self
    }

    /// Sets the delay between two token price refresh cycles.
    pub fn with_price_refresh_delay(mut self, delay: Option<Duration>) -> Self {
        self.token_prices.price_refresh_delay =
            delay.unwrap_or(self.token_prices.price_refresh_delay);
        self
    }

    /// Sets the gas token balance cache TTL.
    pub fn with_balance_ttl(mut self, ttl: Duration) -> Self {
        self.balances.gas_token_balance_cache_ttl = ttl;
        self
    }

    /// Returns the configuration of a chain, if the relayer serves it.
    pub fn network(&self, chain: ChainIdentifier) -> Option<&NetworkConfig> {
        match chain.kind {
            ChainType::Evm => self.networks.get(&chain.id),
        }
    }

    /// Returns the fee configuration of a chain, falling back to the L1 or L2 defaults.
    pub fn fee_config(&self, chain: ChainIdentifier) -> Option<FeeConfig> {
        self.network(chain)
            .map(|network| network.fees.clone().unwrap_or_else(|| FeeConfig::default_for(chain.id)))
    }

    /// Returns every configured chain.
    pub fn chains(&self) -> impl Iterator<Item = ChainIdentifier> + '_ {
        self.networks.keys().copied().map(ChainIdentifier::evm)
    }

    /// Checks values serde cannot check on its own.
    pub fn validate(&self) -> eyre::Result<()> {
        for (chain, network) in &self.networks {
            ensure!(
                network.gas_token.decimals <= MAX_TOKEN_DECIMALS,
                "gas token decimals on chain {chain} exceed {MAX_TOKEN_DECIMALS}"
            );
            for (address, token) in &network.tokens {
                ensure!(
                    token.decimals <= MAX_TOKEN_DECIMALS,
                    "decimals of token {address} on chain {chain} exceed {MAX_TOKEN_DECIMALS}"
                );
            }
            network.gas_token.minimum_balance_wei().wrap_err_with(|| {
                format!("invalid minimum balance for availability on chain {chain}")
            })?;
            if let Some(fees) = &network.fees {
                fees.validate().wrap_err_with(|| format!("invalid fees on chain {chain}"))?;
            }
        }
        ensure!(self.wallets.num_wallets > 0, "at least one wallet is required");
        Ok(())
    }

    /// Load from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> eyre::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_reader(&file)
            .wrap_err_with(|| format!("failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a YAML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> eyre::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Gas fee model of a network.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvmGasType {
    /// Pre EIP-1559 `gasPrice`.
    Legacy,
    /// EIP-1559 `maxFeePerGas` and `maxPriorityFeePerGas`.
    #[default]
    Dynamic,
}

impl fmt::Display for EvmGasType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// Configuration of a single network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Human readable network name, used in logs.
    pub name: String,
    /// JSON-RPC endpoint.
    pub rpc_url: Url,
    /// Gas fee model.
    #[serde(default)]
    pub evm_gas_type: EvmGasType,
    /// Native gas token.
    pub gas_token: GasTokenConfig,
    /// Fee margins. Defaults depend on whether the network is an L2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees: Option<FeeConfig>,
    /// How long a token price is usable after the source reported it.
    #[serde(with = "crate::serde::duration", default = "default_price_ttl")]
    pub price_ttl: Duration,
    /// Tokens accepted as fee payment.
    #[serde(with = "crate::serde::hash_map", default)]
    pub tokens: HashMap<Address, TokenConfig>,
}

impl NetworkConfig {
    /// Returns the configuration of a fee token.
    pub fn token(&self, address: &Address) -> Option<&TokenConfig> {
        self.tokens.get(address)
    }

    /// Symbol of a token for logs, falling back to its address.
    pub fn token_symbol(&self, address: &Address) -> String {
        if *address == self.gas_token.wrapped_address {
            return self.gas_token.symbol.clone();
        }
        self.token(address).map(|token| token.symbol.clone()).unwrap_or_else(|| address.to_string())
    }
}

/// Native gas token of a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasTokenConfig {
    /// Symbol of the gas token.
    pub symbol: String,
    /// Address of the wrapped gas token, used to look up its price.
    pub wrapped_address: Address,
    /// Decimals of the gas token.
    #[serde(default = "default_gas_token_decimals")]
    pub decimals: u8,
    /// Balance in whole gas tokens a wallet needs to accept relay requests.
    #[serde(with = "rust_decimal::serde::str")]
    pub minimum_balance_for_availability: Decimal,
}

impl GasTokenConfig {
    /// Returns the minimum balance for availability in the gas token's smallest unit.
    pub fn minimum_balance_wei(&self) -> eyre::Result<U256> {
        decimal_to_base_units(self.minimum_balance_for_availability, self.decimals)
    }
}

/// A token accepted as fee payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Token symbol.
    pub symbol: String,
    /// Token decimals.
    pub decimals: u8,
}

/// Fee margins applied when converting gas cost into a token fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Fraction added to absorb gas estimate drift between client and relayer.
    pub slippage_buffer: f64,
    /// Fraction kept as profit.
    pub profit: f64,
    /// Smallest token fee, in token base units, the relayer accepts.
    #[serde(default)]
    pub minimum_token_fee: U256,
}

impl FeeConfig {
    /// Default margins for L1 networks.
    pub fn l1() -> Self {
        Self { slippage_buffer: 0.05, profit: 0.01, minimum_token_fee: U256::ZERO }
    }

    /// Default margins for L2 networks, where gas estimates drift by 5-10% between client and
    /// relayer. Unused buffer becomes profit.
    pub fn l2() -> Self {
        Self { slippage_buffer: 0.2, profit: 0.01, minimum_token_fee: U256::ZERO }
    }

    /// Default margins for the given network.
    pub fn default_for(chain: NetworkChainId) -> Self {
        if chain.is_l2() { Self::l2() } else { Self::l1() }
    }

    /// Multiplier applied to the gas token to fee token rate.
    pub fn multiplier(&self) -> f64 {
        1.0 + self.slippage_buffer + self.profit
    }

    fn validate(&self) -> eyre::Result<()> {
        ensure!(
            self.slippage_buffer.is_finite() && self.slippage_buffer >= 0.0,
            "slippage buffer must be a non-negative number"
        );
        ensure!(
            self.profit.is_finite() && self.profit >= 0.0,
            "profit must be a non-negative number"
        );
        Ok(())
    }
}

/// Gas token balance cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceConfig {
    /// How long a cached wallet balance is usable.
    #[serde(with = "crate::serde::duration")]
    pub gas_token_balance_cache_ttl: Duration,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self { gas_token_balance_cache_ttl: DEFAULT_BALANCE_TTL }
    }
}

/// Token price polling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPriceConfig {
    /// Delay between the end of one refresh cycle and the start of the next.
    #[serde(with = "crate::serde::duration")]
    pub price_refresh_delay: Duration,
    /// CoinGecko API base URL.
    pub coingecko_api_url: Url,
    /// CoinGecko API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coingecko_api_key: Option<String>,
}

impl Default for TokenPriceConfig {
    fn default() -> Self {
        Self {
            price_refresh_delay: DEFAULT_PRICE_REFRESH_DELAY,
            coingecko_api_url: Url::parse("https://api.coingecko.com/api/v3/")
                .expect("valid url"),
            coingecko_api_key: None,
        }
    }
}

/// Waku REST bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakuConfig {
    /// Primary bridge URL, used for the first attempt of every request.
    pub url: Url,
    /// Backup bridge URL, used for every retry.
    pub url_backup: Url,
    /// Timeout of a single call.
    #[serde(with = "crate::serde::duration")]
    pub request_timeout: Duration,
    /// Overall timeout of the HTTP client.
    #[serde(with = "crate::serde::duration")]
    pub client_timeout: Duration,
    /// Pubsub topic messages are published to.
    pub pubsub_topic: String,
}

impl Default for WakuConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("http://127.0.0.1:8546").expect("valid url"),
            url_backup: Url::parse("http://127.0.0.1:8547").expect("valid url"),
            request_timeout: WAKU_REQUEST_TIMEOUT,
            client_timeout: WAKU_CLIENT_TIMEOUT,
            pubsub_topic: DEFAULT_PUBSUB_TOPIC.to_string(),
        }
    }
}

/// Fee broadcast configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// How long a broadcast set of fees stays valid for clients.
    #[serde(with = "crate::serde::duration")]
    pub fee_expiration: Duration,
    /// Interval between two fee broadcasts.
    #[serde(with = "crate::serde::duration")]
    pub interval: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { fee_expiration: DEFAULT_FEE_EXPIRATION, interval: DEFAULT_FEE_BROADCAST_INTERVAL }
    }
}

/// Relayer wallet configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Number of wallets derived from the mnemonic.
    pub num_wallets: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self { num_wallets: DEFAULT_NUM_WALLETS }
    }
}

/// Secrets (never serialized).
#[derive(Debug, Clone, Default)]
pub struct SecretsConfig {
    /// Mnemonic the relayer wallets are derived from.
    pub wallets_mnemonic: Option<Mnemonic<English>>,
}

fn default_price_ttl() -> Duration {
    DEFAULT_PRICE_TTL
}

fn default_gas_token_decimals() -> u8 {
    DEFAULT_GAS_TOKEN_DECIMALS
}

/// Converts an amount of whole tokens into base units, truncating digits beyond `decimals`.
pub fn decimal_to_base_units(amount: Decimal, decimals: u8) -> eyre::Result<U256> {
    if amount.is_sign_negative() && !amount.is_zero() {
        bail!("amount must not be negative: {amount}");
    }
    let amount = amount.normalize();
    let mantissa = U256::from(amount.mantissa().unsigned_abs());
    let scale = amount.scale();
    let decimals = u32::from(decimals);
    let units = if scale <= decimals {
        U256::from(10)
            .checked_pow(U256::from(decimals - scale))
            .and_then(|factor| mantissa.checked_mul(factor))
    } else {
        U256::from(10).checked_pow(U256::from(scale - decimals)).map(|divisor| mantissa / divisor)
    };
    units.ok_or_eyre("amount overflows 256 bits")
}
