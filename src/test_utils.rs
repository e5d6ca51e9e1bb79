//! Fixtures shared by unit tests.

use crate::{
    chains::{ChainIdentifier, NetworkChainId},
    config::{EvmGasType, FeeConfig, GasTokenConfig, NetworkConfig, RelayerConfig, TokenConfig},
    error::PricingError,
    price::{TokenPrice, TokenPriceSource},
    provider::{ChainProvider, ChainProviders, ProviderFeeData},
};
use alloy::{
    primitives::{Address, B256, Bytes, TxHash, U256, address, map::HashMap},
    rpc::types::TransactionRequest,
    transports::{TransportErrorKind, TransportResult},
};
use dashmap::{DashMap, DashSet};
use rust_decimal::Decimal;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

pub const ETHEREUM: ChainIdentifier = ChainIdentifier::evm(NetworkChainId::Ethereum);
pub const POLYGON: ChainIdentifier = ChainIdentifier::evm(NetworkChainId::PolygonPos);

/// Wrapped gas token of both test networks.
pub const WETH: Address = address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
/// An 18 decimal fee token.
pub const DAI: Address = address!("0x6B175474E89094C44Da98b954EedeAC495271d0F");
/// A 6 decimal fee token.
pub const USDC: Address = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

pub const PRICE_TTL: Duration = Duration::from_secs(300);
pub const BALANCE_TTL: Duration = Duration::from_secs(600);

/// One whole gas token.
pub fn ether(amount: u64) -> U256 {
    U256::from(amount) * U256::from(10).pow(U256::from(18))
}

pub fn wallet(n: u8) -> Address {
    Address::with_last_byte(n)
}

pub fn network(evm_gas_type: EvmGasType) -> NetworkConfig {
    NetworkConfig {
        name: "Test".to_string(),
        rpc_url: "http://localhost:8545".parse().unwrap(),
        evm_gas_type,
        gas_token: GasTokenConfig {
            symbol: "ETH".to_string(),
            wrapped_address: WETH,
            decimals: 18,
            minimum_balance_for_availability: Decimal::ONE,
        },
        fees: Some(FeeConfig {
            slippage_buffer: 0.05,
            profit: 0.05,
            minimum_token_fee: U256::ZERO,
        }),
        price_ttl: PRICE_TTL,
        tokens: HashMap::from_iter([
            (DAI, TokenConfig { symbol: "DAI".to_string(), decimals: 18 }),
            (USDC, TokenConfig { symbol: "USDC".to_string(), decimals: 6 }),
        ]),
    }
}

/// Ethereum on the legacy gas model, Polygon on the dynamic one.
pub fn test_config() -> Arc<RelayerConfig> {
    Arc::new(
        RelayerConfig::default()
            .with_network(NetworkChainId::Ethereum, network(EvmGasType::Legacy))
            .with_network(NetworkChainId::PolygonPos, network(EvmGasType::Dynamic))
            .with_balance_ttl(BALANCE_TTL),
    )
}

pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
}

pub fn price(price: f64) -> TokenPrice {
    TokenPrice { price, updated_at: now_ms() }
}

/// A provider with canned answers.
#[derive(Debug, Default)]
pub struct MockProvider {
    pub gas_estimate: u64,
    pub fee_data: ProviderFeeData,
    pub balances: DashMap<Address, U256>,
    /// Addresses whose balance lookups fail.
    pub failing_balances: DashSet<Address>,
    /// When set, gas and fee data calls fail with this message.
    pub error: Option<String>,
    pub balance_calls: AtomicUsize,
    pub sent: Mutex<Vec<Bytes>>,
}

impl MockProvider {
    pub fn with_balance(self, address: Address, balance: U256) -> Self {
        self.balances.insert(address, balance);
        self
    }

    fn fail_if_configured(&self) -> TransportResult<()> {
        match &self.error {
            Some(message) => Err(TransportErrorKind::custom_str(message)),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ChainProvider for MockProvider {
    async fn estimate_gas(&self, _tx: TransactionRequest) -> TransportResult<u64> {
        self.fail_if_configured()?;
        Ok(self.gas_estimate)
    }

    async fn fee_data(&self) -> TransportResult<ProviderFeeData> {
        self.fail_if_configured()?;
        Ok(self.fee_data)
    }

    async fn balance(&self, address: Address) -> TransportResult<U256> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_balances.contains(&address) {
            return Err(TransportErrorKind::custom_str("balance unavailable"));
        }
        Ok(self.balances.get(&address).map(|balance| *balance).unwrap_or_default())
    }

    async fn transaction_count(&self, _address: Address) -> TransportResult<u64> {
        Ok(self.sent.lock().unwrap().len() as u64)
    }

    async fn send_raw_transaction(&self, encoded: Bytes) -> TransportResult<TxHash> {
        let hash = alloy::primitives::keccak256(&encoded);
        self.sent.lock().unwrap().push(encoded);
        Ok(B256::from(hash))
    }
}

pub fn providers(entries: Vec<(ChainIdentifier, Arc<MockProvider>)>) -> ChainProviders {
    entries
        .into_iter()
        .map(|(chain, provider)| (chain, provider as Arc<dyn ChainProvider>))
        .collect()
}

/// A price source with fixed prices per chain.
#[derive(Debug, Default)]
pub struct MockPriceSource {
    pub prices: DashMap<ChainIdentifier, HashMap<Address, TokenPrice>>,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[async_trait::async_trait]
impl TokenPriceSource for MockPriceSource {
    async fn fetch(
        &self,
        chain: ChainIdentifier,
        tokens: &[Address],
    ) -> Result<HashMap<Address, TokenPrice>, PricingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let prices = self.prices.get(&chain).ok_or(PricingError::UnsupportedChain(chain))?;
        Ok(prices
            .iter()
            .filter(|(token, _)| tokens.contains(token))
            .map(|(token, price)| (*token, *price))
            .collect())
    }
}
