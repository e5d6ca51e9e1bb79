//! Gas estimation and token fee pricing.

pub mod fees;
pub mod gas;

pub use fees::{FeeCalculator, FeeQuote, UnitTokenFees};
pub use gas::{
    GasDetails, GasFeeData, calculate_gas_limit, calculate_maximum_gas, calculate_total_gas,
    estimate_gas_details,
};
