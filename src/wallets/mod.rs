//! Relayer wallets and their admission state.

use crate::{
    pricing::{GasDetails, GasFeeData},
    signers::DynSigner,
};
use alloy::{
    eips::eip2718::Encodable2718,
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes},
    rpc::types::TransactionRequest,
    signers::local::coins_bip39::{English, Mnemonic},
};
use eyre::eyre;

mod availability;
pub use availability::{BusyWallet, WalletAvailability};

/// A wallet the relayer broadcasts transactions from.
///
/// Wallets are derived once at startup and live for the whole process. Whether a wallet is busy
/// is tracked by [`WalletAvailability`], not by the wallet itself.
#[derive(Debug, Clone)]
pub struct RelayerWallet {
    address: Address,
    signer: DynSigner,
}

impl RelayerWallet {
    /// Wraps a signer.
    pub fn new(signer: DynSigner) -> Self {
        Self { address: signer.address(), signer }
    }

    /// Derives `num` wallets from a mnemonic.
    pub fn derive_from_mnemonic(
        mnemonic: &Mnemonic<English>,
        num: usize,
    ) -> eyre::Result<Vec<Self>> {
        Ok(DynSigner::derive_from_mnemonic(mnemonic, num)?.into_iter().map(Self::new).collect())
    }

    /// The wallet address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Signs `tx` with the given nonce, gas limit and fee data, returning the EIP-2718 encoding.
    pub async fn sign_transaction(
        &self,
        chain_id: u64,
        nonce: u64,
        tx: TransactionRequest,
        gas: &GasDetails,
    ) -> eyre::Result<Bytes> {
        let gas_limit: u64 =
            gas.gas_limit().try_into().map_err(|_| eyre!("gas limit does not fit in u64"))?;

        let mut tx = tx
            .with_from(self.address)
            .with_chain_id(chain_id)
            .with_nonce(nonce)
            .with_gas_limit(gas_limit);
        match gas.fee_data {
            GasFeeData::Legacy { gas_price } => tx.set_gas_price(gas_price),
            GasFeeData::Dynamic { max_fee_per_gas, max_priority_fee_per_gas } => {
                tx.set_max_fee_per_gas(max_fee_per_gas);
                tx.set_max_priority_fee_per_gas(max_priority_fee_per_gas);
            }
        }

        let wallet = EthereumWallet::new(self.signer.0.clone());
        Ok(tx.build(&wallet).await?.encoded_2718().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{
        consensus::{Transaction, TxEnvelope},
        eips::eip2718::Decodable2718,
        primitives::{U256, address},
    };
    use std::str::FromStr;

    fn wallet() -> RelayerWallet {
        let mnemonic = Mnemonic::<English>::from_str(
            "test test test test test test test test test test test junk",
        )
        .unwrap();
        RelayerWallet::derive_from_mnemonic(&mnemonic, 1).unwrap().remove(0)
    }

    fn transfer() -> TransactionRequest {
        TransactionRequest::default()
            .with_to(address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8"))
            .with_value(U256::from(1))
    }

    #[tokio::test]
    async fn signs_legacy_transactions() {
        let gas = GasDetails {
            gas_estimate: U256::from(21_000),
            fee_data: GasFeeData::Legacy { gas_price: 1_000_000_000 },
        };
        let encoded = wallet().sign_transaction(1, 7, transfer(), &gas).await.unwrap();

        let envelope = TxEnvelope::decode_2718(&mut encoded.as_ref()).unwrap();
        assert!(envelope.is_legacy());
        assert_eq!(envelope.nonce(), 7);
        assert_eq!(envelope.gas_limit(), 25_200);
    }

    #[tokio::test]
    async fn signs_dynamic_transactions() {
        let gas = GasDetails {
            gas_estimate: U256::from(21_000),
            fee_data: GasFeeData::Dynamic {
                max_fee_per_gas: 2_000_000_000,
                max_priority_fee_per_gas: 1_000_000,
            },
        };
        let encoded = wallet().sign_transaction(137, 0, transfer(), &gas).await.unwrap();

        let envelope = TxEnvelope::decode_2718(&mut encoded.as_ref()).unwrap();
        assert!(envelope.is_eip1559());
        assert_eq!(envelope.chain_id(), Some(137));
        assert_eq!(envelope.max_fee_per_gas(), 2_000_000_000);
    }
}
