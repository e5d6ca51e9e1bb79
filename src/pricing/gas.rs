//! Gas estimation.
//!
//! Two cost figures are derived from a [`GasDetails`]: the expected cost
//! ([`calculate_total_gas`], unpadded estimate) and the worst-case cost
//! ([`calculate_maximum_gas`], padded gas limit). Fees are always charged on the worst case.

use crate::{
    chains::ChainIdentifier,
    config::EvmGasType,
    constants::{BPS_DENOMINATOR, GAS_LIMIT_MARGIN_BPS},
    error::PricingError,
    provider::{ChainProvider, ProviderFeeData},
};
use alloy::{primitives::U256, rpc::types::TransactionRequest, transports::TransportError};
use tracing::{debug, instrument, warn};

/// Provider error raised when redundant RPC backends disagree.
const QUORUM_FAILURE: &str = "failed to meet quorum";

/// Gas fee data matching the network's gas model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasFeeData {
    /// Pre EIP-1559 pricing.
    Legacy {
        /// Gas price in wei.
        gas_price: u128,
    },
    /// EIP-1559 pricing.
    Dynamic {
        /// Max fee per gas in wei.
        max_fee_per_gas: u128,
        /// Max priority fee per gas in wei.
        max_priority_fee_per_gas: u128,
    },
}

impl GasFeeData {
    /// Builds fee data for `model` out of raw provider data.
    pub fn from_provider(model: EvmGasType, raw: ProviderFeeData) -> Result<Self, PricingError> {
        match model {
            EvmGasType::Legacy => raw
                .gas_price
                .map(|gas_price| Self::Legacy { gas_price })
                .ok_or(PricingError::MissingFeeData(model)),
            EvmGasType::Dynamic => match (raw.max_fee_per_gas, raw.max_priority_fee_per_gas) {
                (Some(max_fee_per_gas), Some(max_priority_fee_per_gas)) => {
                    Ok(Self::Dynamic { max_fee_per_gas, max_priority_fee_per_gas })
                }
                _ => Err(PricingError::MissingFeeData(model)),
            },
        }
    }

    /// Price paid per gas unit. For EIP-1559 this is `max_fee + max_priority_fee`.
    pub fn gas_price(&self) -> U256 {
        match *self {
            Self::Legacy { gas_price } => U256::from(gas_price),
            Self::Dynamic { max_fee_per_gas, max_priority_fee_per_gas } => {
                U256::from(max_fee_per_gas) + U256::from(max_priority_fee_per_gas)
            }
        }
    }

    /// The gas model of this fee data.
    pub fn gas_type(&self) -> EvmGasType {
        match self {
            Self::Legacy { .. } => EvmGasType::Legacy,
            Self::Dynamic { .. } => EvmGasType::Dynamic,
        }
    }
}

/// A gas estimate with the fee data it was priced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasDetails {
    /// Simulated gas units.
    pub gas_estimate: U256,
    /// Fee data.
    pub fee_data: GasFeeData,
}

impl GasDetails {
    /// The gas limit to send the transaction with.
    pub fn gas_limit(&self) -> U256 {
        calculate_gas_limit(self.gas_estimate)
    }
}

/// Pads a gas estimate by 20%, truncating.
pub fn calculate_gas_limit(gas_estimate: U256) -> U256 {
    gas_estimate * U256::from(GAS_LIMIT_MARGIN_BPS) / U256::from(BPS_DENOMINATOR)
}

/// Expected cost of the transaction in gas token wei.
pub fn calculate_total_gas(details: &GasDetails) -> U256 {
    details.gas_estimate * details.fee_data.gas_price()
}

/// Worst-case cost of the transaction in gas token wei.
pub fn calculate_maximum_gas(details: &GasDetails) -> U256 {
    details.gas_limit() * details.fee_data.gas_price()
}

/// Estimates the gas used by `tx` and fetches fee data, concurrently.
#[instrument(skip(provider, tx))]
pub async fn estimate_gas_details(
    chain: ChainIdentifier,
    model: EvmGasType,
    provider: &dyn ChainProvider,
    tx: TransactionRequest,
) -> Result<GasDetails, PricingError> {
    let (gas_estimate, raw) = tokio::try_join!(provider.estimate_gas(tx), provider.fee_data())
        .map_err(provider_error)?;

    let details = GasDetails {
        gas_estimate: U256::from(gas_estimate),
        fee_data: GasFeeData::from_provider(model, raw)?,
    };
    debug!(?details, "Estimated gas");
    Ok(details)
}

/// Maps provider quorum failures onto [`PricingError::BadFeeData`].
fn provider_error(err: TransportError) -> PricingError {
    let message = err.to_string();
    if message.contains(QUORUM_FAILURE) {
        warn!(%message, "Providers failed to agree on gas data");
        return PricingError::BadFeeData(message);
    }
    PricingError::Provider(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ETHEREUM, MockProvider};

    const GAS_ESTIMATE: u64 = 1_000_000_000_000_000;

    fn legacy(gas_price: u128) -> ProviderFeeData {
        ProviderFeeData { gas_price: Some(gas_price), ..Default::default() }
    }

    fn dynamic(max_fee: u128, priority: u128) -> ProviderFeeData {
        ProviderFeeData {
            gas_price: None,
            max_fee_per_gas: Some(max_fee),
            max_priority_fee_per_gas: Some(priority),
        }
    }

    #[test]
    fn gas_limit_adds_twenty_percent_truncating() {
        assert_eq!(
            calculate_gas_limit(U256::from(GAS_ESTIMATE)),
            U256::from(1_200_000_000_000_000u64)
        );
        assert_eq!(calculate_gas_limit(U256::from(21_000)), U256::from(25_200));
        assert_eq!(calculate_gas_limit(U256::from(7)), U256::from(8));
    }

    #[test]
    fn fee_data_follows_gas_model() {
        assert_eq!(
            GasFeeData::from_provider(EvmGasType::Legacy, legacy(90_000)).unwrap(),
            GasFeeData::Legacy { gas_price: 90_000 }
        );
        assert_eq!(
            GasFeeData::from_provider(EvmGasType::Dynamic, dynamic(90_000, 10_000)).unwrap(),
            GasFeeData::Dynamic { max_fee_per_gas: 90_000, max_priority_fee_per_gas: 10_000 }
        );

        // present fields of the other model are not a substitute
        assert!(matches!(
            GasFeeData::from_provider(EvmGasType::Legacy, dynamic(90_000, 10_000)),
            Err(PricingError::MissingFeeData(EvmGasType::Legacy))
        ));
        let partial = ProviderFeeData { max_fee_per_gas: Some(1), ..legacy(1) };
        assert!(matches!(
            GasFeeData::from_provider(EvmGasType::Dynamic, partial),
            Err(PricingError::MissingFeeData(EvmGasType::Dynamic))
        ));
    }

    #[test]
    fn total_and_maximum_gas_are_distinct() {
        let legacy = GasDetails {
            gas_estimate: U256::from(GAS_ESTIMATE),
            fee_data: GasFeeData::Legacy { gas_price: 90_000 },
        };
        assert_eq!(calculate_total_gas(&legacy), U256::from(90_000_000_000_000_000_000u128));
        assert_eq!(calculate_maximum_gas(&legacy), U256::from(108_000_000_000_000_000_000u128));

        let dynamic = GasDetails {
            gas_estimate: U256::from(GAS_ESTIMATE),
            fee_data: GasFeeData::Dynamic {
                max_fee_per_gas: 90_000,
                max_priority_fee_per_gas: 10_000,
            },
        };
        assert_eq!(dynamic.fee_data.gas_price(), U256::from(100_000));
        assert_eq!(calculate_total_gas(&dynamic), U256::from(100_000_000_000_000_000_000u128));
        assert_eq!(calculate_maximum_gas(&dynamic), U256::from(120_000_000_000_000_000_000u128));
    }

    #[tokio::test]
    async fn estimates_with_provider() {
        let provider =
            MockProvider { gas_estimate: 50_000, fee_data: legacy(7), ..Default::default() };
        let details =
            estimate_gas_details(ETHEREUM, EvmGasType::Legacy, &provider, Default::default())
                .await
                .unwrap();
        assert_eq!(details.gas_estimate, U256::from(50_000));
        assert_eq!(details.fee_data.gas_type(), EvmGasType::Legacy);
        assert_eq!(details.gas_limit(), U256::from(60_000));
    }

    #[tokio::test]
    async fn quorum_failure_is_bad_fee_data() {
        let provider = MockProvider {
            error: Some("failed to meet quorum (method=\"estimateGas\")".to_string()),
            ..Default::default()
        };
        let err = estimate_gas_details(ETHEREUM, EvmGasType::Legacy, &provider, Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PricingError::BadFeeData(_)));

        let provider =
            MockProvider { error: Some("connection reset".to_string()), ..Default::default() };
        let err = estimate_gas_details(ETHEREUM, EvmGasType::Legacy, &provider, Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PricingError::Provider(_)));
    }

    #[tokio::test]
    async fn missing_fee_data_fails_estimation() {
        let provider =
            MockProvider { gas_estimate: 21_000, fee_data: legacy(1), ..Default::default() };
        let err = estimate_gas_details(ETHEREUM, EvmGasType::Dynamic, &provider, Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PricingError::MissingFeeData(EvmGasType::Dynamic)));
    }
}
