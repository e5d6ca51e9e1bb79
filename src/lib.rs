//! # Shielded Relayer
//!
//! Library for a relayer of shielded transfers: wallet admission, token fee pricing and delivery
//! over a Waku REST bridge.

pub mod cache;
pub mod chains;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod networking;
pub mod periodic;
pub mod price;
pub mod pricing;
pub mod provider;
pub mod relayer;
pub mod serde;
pub mod signers;
pub mod spawn;
pub mod wallets;

#[cfg(test)]
pub mod test_utils;
