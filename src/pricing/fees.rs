//! Conversion of gas costs into token fees.
//!
//! Prices arrive as floats. They are combined into a single gas token to fee token rate with
//! [`FEE_RATE_DECIMALS`] decimal places, and everything after that is integer math on [`U256`].

use crate::{
    cache::{FeeCacheId, PriceSnapshot, TokenPriceCache},
    chains::ChainIdentifier,
    config::{FeeConfig, NetworkConfig, RelayerConfig},
    constants::{FEE_RATE_DECIMALS, MAX_EXACT_FLOAT_INTEGER},
    error::PricingError,
};
use alloy::primitives::{Address, U256, map::HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// A fee for one transaction, tied to the price generation it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    /// Fee token.
    pub token_address: Address,
    /// Fee in token base units.
    pub amount: U256,
    /// Price generation the fee was computed from.
    pub fee_cache_id: FeeCacheId,
}

/// Price of one whole gas token in every fee token of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitTokenFees {
    /// Token base units per whole gas token, by token.
    pub fees: HashMap<Address, U256>,
    /// Price generation the fees were computed from.
    pub fee_cache_id: FeeCacheId,
}

/// Fixed-point rate from gas token to fee token, including fee margins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FeeRate {
    /// Whole fee tokens per whole gas token, times `10^FEE_RATE_DECIMALS`.
    scaled: U256,
    token_decimals: u8,
    gas_token_decimals: u8,
}

impl FeeRate {
    /// Token base units per whole gas token.
    fn unit_fee(&self) -> U256 {
        self.scaled * pow10(self.token_decimals) / pow10(FEE_RATE_DECIMALS)
    }

    /// Token base units for `gas_cost` gas token wei.
    fn fee_for(&self, gas_cost: U256) -> Option<U256> {
        let numerator = gas_cost.checked_mul(self.scaled)?.checked_mul(pow10(self.token_decimals))?;
        Some(numerator / (pow10(FEE_RATE_DECIMALS) * pow10(self.gas_token_decimals)))
    }
}

/// Computes token fees from cached prices and the network's fee margins.
#[derive(Debug, Clone)]
pub struct FeeCalculator {
    config: Arc<RelayerConfig>,
    prices: TokenPriceCache,
}

impl FeeCalculator {
    /// Creates a calculator reading prices from `prices`.
    pub fn new(config: Arc<RelayerConfig>, prices: TokenPriceCache) -> Self {
        Self { config, prices }
    }

    /// Price of one whole gas token in base units of `token`.
    pub fn unit_token_fee(
        &self,
        chain: ChainIdentifier,
        token: Address,
    ) -> Result<U256, PricingError> {
        let (network, fees) = self.network(chain)?;
        let snapshot = self.prices.snapshot(chain)?;
        let unit_fee = self.rate(chain, network, &fees, &snapshot, token)?.unit_fee();
        if unit_fee.is_zero() {
            return Err(PricingError::PrecisionUnderflow {
                token,
                reason: "unit fee rounds to zero",
            });
        }
        Ok(unit_fee)
    }

    /// Fee in base units of `token` covering `maximum_gas` gas token wei.
    pub fn token_fee(
        &self,
        chain: ChainIdentifier,
        maximum_gas: U256,
        token: Address,
    ) -> Result<U256, PricingError> {
        self.quote(chain, maximum_gas, token).map(|quote| quote.amount)
    }

    /// Quotes the fee covering `maximum_gas` gas token wei, with the price generation it used.
    #[instrument(skip(self))]
    pub fn quote(
        &self,
        chain: ChainIdentifier,
        maximum_gas: U256,
        token: Address,
    ) -> Result<FeeQuote, PricingError> {
        let (network, fees) = self.network(chain)?;
        let snapshot = self.prices.snapshot(chain)?;
        let rate = self.rate(chain, network, &fees, &snapshot, token)?;

        let amount = rate
            .fee_for(maximum_gas)
            .ok_or(PricingError::PrecisionUnderflow { token, reason: "fee overflows 256 bits" })?;
        check_fee(token, amount, &fees)?;

        debug!(%amount, fee_cache_id = %snapshot.id(), "Quoted token fee");
        Ok(FeeQuote { token_address: token, amount, fee_cache_id: snapshot.id() })
    }

    /// Quotes the fee covering `maximum_gas` gas token wei from unit fees computed earlier,
    /// regardless of the prices cached now.
    pub fn quote_from_unit_fees(
        &self,
        chain: ChainIdentifier,
        maximum_gas: U256,
        token: Address,
        unit_fees: &UnitTokenFees,
    ) -> Result<FeeQuote, PricingError> {
        let (network, fees) = self.network(chain)?;
        let unit_fee =
            *unit_fees.fees.get(&token).ok_or(PricingError::UnsupportedToken { chain, token })?;

        let amount = maximum_gas
            .checked_mul(unit_fee)
            .ok_or(PricingError::PrecisionUnderflow { token, reason: "fee overflows 256 bits" })?
            / pow10(network.gas_token.decimals);
        check_fee(token, amount, &fees)?;

        Ok(FeeQuote { token_address: token, amount, fee_cache_id: unit_fees.fee_cache_id })
    }

    /// Unit fees of every token configured on `chain`, from one price generation.
    ///
    /// Tokens that cannot be priced are logged and left out.
    pub fn all_unit_token_fees(
        &self,
        chain: ChainIdentifier,
    ) -> Result<UnitTokenFees, PricingError> {
        let (network, fee_config) = self.network(chain)?;
        let snapshot = self.prices.snapshot(chain)?;

        let fees = network
            .tokens
            .keys()
            .filter_map(|token| {
                let unit_fee = self
                    .rate(chain, network, &fee_config, &snapshot, *token)
                    .map(|rate| rate.unit_fee());
                match unit_fee {
                    Ok(fee) if !fee.is_zero() => Some((*token, fee)),
                    Ok(_) => {
                        warn!(%chain, %token, "Unit fee rounds to zero, skipping token");
                        None
                    }
                    Err(err) => {
                        warn!(%chain, %token, %err, "Could not price token, skipping");
                        None
                    }
                }
            })
            .collect();

        Ok(UnitTokenFees { fees, fee_cache_id: snapshot.id() })
    }

    fn network(&self, chain: ChainIdentifier) -> Result<(&NetworkConfig, FeeConfig), PricingError> {
        let network = self.config.network(chain).ok_or(PricingError::UnsupportedChain(chain))?;
        let fees = self.config.fee_config(chain).ok_or(PricingError::UnsupportedChain(chain))?;
        Ok((network, fees))
    }

    fn rate(
        &self,
        chain: ChainIdentifier,
        network: &NetworkConfig,
        fees: &FeeConfig,
        snapshot: &PriceSnapshot<'_>,
        token: Address,
    ) -> Result<FeeRate, PricingError> {
        let token_config =
            network.token(&token).ok_or(PricingError::UnsupportedToken { chain, token })?;
        let pair = snapshot.lookup_pair(token, network.gas_token.wrapped_address)?;

        let scaled = scaled_rate(pair.gas_token_price, pair.token_price, fees.multiplier())
            .ok_or(PricingError::PrecisionUnderflow {
                token,
                reason: "price ratio out of exact range",
            })?;

        Ok(FeeRate {
            scaled,
            token_decimals: token_config.decimals,
            gas_token_decimals: network.gas_token.decimals,
        })
    }
}

/// `round(gas_token_price / token_price * multiplier * 10^FEE_RATE_DECIMALS)`, if the float is
/// a positive integer `f64` represents exactly.
fn scaled_rate(gas_token_price: f64, token_price: f64, multiplier: f64) -> Option<U256> {
    let scaled = (gas_token_price / token_price * multiplier * 10f64.powi(FEE_RATE_DECIMALS.into()))
        .round();
    if !scaled.is_finite() || scaled < 1.0 || scaled > MAX_EXACT_FLOAT_INTEGER {
        return None;
    }
    Some(U256::from(scaled as u64))
}

fn check_fee(token: Address, amount: U256, fees: &FeeConfig) -> Result<(), PricingError> {
    if amount.is_zero() {
        return Err(PricingError::PrecisionUnderflow { token, reason: "fee rounds to zero" });
    }
    if amount < fees.minimum_token_fee {
        return Err(PricingError::PrecisionUnderflow {
            token,
            reason: "fee below the minimum token fee",
        });
    }
    Ok(())
}

fn pow10(exp: u8) -> U256 {
    U256::from(10).pow(U256::from(exp))
}
