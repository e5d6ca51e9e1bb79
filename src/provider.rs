//! Chain provider seam.
//!
//! The relayer only needs a handful of provider calls. They sit behind [`ChainProvider`] so the
//! caches and the fee engine can be driven by any alloy provider, or by a mock in tests.

use crate::chains::ChainIdentifier;
use alloy::{
    primitives::{Address, Bytes, TxHash, U256, map::HashMap},
    providers::{DynProvider, Provider},
    rpc::types::TransactionRequest,
    transports::TransportResult,
};
use std::{fmt, sync::Arc};
use tracing::trace;

/// Fee data as reported by a provider. Which fields are present depends on the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderFeeData {
    /// Legacy gas price.
    pub gas_price: Option<u128>,
    /// EIP-1559 max fee per gas.
    pub max_fee_per_gas: Option<u128>,
    /// EIP-1559 max priority fee per gas.
    pub max_priority_fee_per_gas: Option<u128>,
}

/// Provider calls used by the relayer.
#[async_trait::async_trait]
pub trait ChainProvider: Send + Sync + fmt::Debug {
    /// Simulates `tx` and returns the gas units it consumes.
    async fn estimate_gas(&self, tx: TransactionRequest) -> TransportResult<u64>;

    /// Returns the current fee data.
    async fn fee_data(&self) -> TransportResult<ProviderFeeData>;

    /// Returns the native balance of `address`.
    async fn balance(&self, address: Address) -> TransportResult<U256>;

    /// Returns the pending nonce of `address`.
    async fn transaction_count(&self, address: Address) -> TransportResult<u64>;

    /// Broadcasts a signed, encoded transaction.
    async fn send_raw_transaction(&self, encoded: Bytes) -> TransportResult<TxHash>;
}

#[async_trait::async_trait]
impl ChainProvider for DynProvider {
    async fn estimate_gas(&self, tx: TransactionRequest) -> TransportResult<u64> {
        Provider::estimate_gas(self, tx).await
    }

    async fn fee_data(&self) -> TransportResult<ProviderFeeData> {
        let (gas_price, eip1559) = tokio::join!(self.get_gas_price(), self.estimate_eip1559_fees());
        trace!(?gas_price, ?eip1559, "Fetched fee data");

        match (gas_price, eip1559) {
            (Err(err), Err(_)) => Err(err),
            (gas_price, eip1559) => {
                let eip1559 = eip1559.ok();
                Ok(ProviderFeeData {
                    gas_price: gas_price.ok(),
                    max_fee_per_gas: eip1559.map(|fees| fees.max_fee_per_gas),
                    max_priority_fee_per_gas: eip1559.map(|fees| fees.max_priority_fee_per_gas),
                })
            }
        }
    }

    async fn balance(&self, address: Address) -> TransportResult<U256> {
        self.get_balance(address).await
    }

    async fn transaction_count(&self, address: Address) -> TransportResult<u64> {
        self.get_transaction_count(address).pending().await
    }

    async fn send_raw_transaction(&self, encoded: Bytes) -> TransportResult<TxHash> {
        Provider::send_raw_transaction(self, &encoded).await.map(|pending| *pending.tx_hash())
    }
}

/// Providers of every configured chain.
#[derive(Debug, Clone, Default)]
pub struct ChainProviders(Arc<HashMap<ChainIdentifier, Arc<dyn ChainProvider>>>);

impl ChainProviders {
    /// Returns the provider of `chain`.
    pub fn get(&self, chain: ChainIdentifier) -> Option<Arc<dyn ChainProvider>> {
        self.0.get(&chain).cloned()
    }

    /// Returns every chain with a provider.
    pub fn chains(&self) -> impl Iterator<Item = ChainIdentifier> + '_ {
        self.0.keys().copied()
    }
}

impl FromIterator<(ChainIdentifier, Arc<dyn ChainProvider>)> for ChainProviders {
    fn from_iter<T: IntoIterator<Item = (ChainIdentifier, Arc<dyn ChainProvider>)>>(
        iter: T,
    ) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}
