//! Wallet admission control.
//!
//! A wallet is either Available or Busy on each chain. Busy is the only thing preventing two
//! relay requests from broadcasting from the same wallet with conflicting nonces, so the
//! Available to Busy transition is a compare-and-set performed under the map's shard lock.

use super::RelayerWallet;
use crate::{
    cache::GasBalanceCache, chains::ChainIdentifier, config::RelayerConfig, error::AdmissionError,
};
use alloy::primitives::{Address, U256};
use dashmap::{DashMap, mapref::entry::Entry};
use futures_util::future::join_all;
use metrics::counter;
use std::{ops::Deref, sync::Arc};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Per-chain, per-wallet admission state.
#[derive(Debug, Clone)]
pub struct WalletAvailability {
    /// Busy wallets and since when they are busy. Absent means Available.
    busy: Arc<DashMap<(ChainIdentifier, Address), Instant>>,
    balances: GasBalanceCache,
    config: Arc<RelayerConfig>,
}

impl WalletAvailability {
    /// Creates a controller with every wallet Available.
    pub fn new(balances: GasBalanceCache, config: Arc<RelayerConfig>) -> Self {
        Self { busy: Default::default(), balances, config }
    }

    /// Marks `wallet` Busy if it is Available. Returns whether this call made the transition.
    pub fn mark_busy(&self, chain: ChainIdentifier, wallet: Address) -> bool {
        match self.busy.entry((chain, wallet)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                true
            }
        }
    }

    /// Marks `wallet` Available.
    pub fn mark_available(&self, chain: ChainIdentifier, wallet: Address) {
        if let Some((_, since)) = self.busy.remove(&(chain, wallet)) {
            debug!(%chain, %wallet, busy_for = ?since.elapsed(), "Wallet available");
        }
    }

    /// Whether `wallet` is Busy.
    pub fn is_busy(&self, chain: ChainIdentifier, wallet: Address) -> bool {
        self.busy.contains_key(&(chain, wallet))
    }

    /// Whether `wallet` is idle and holds at least the chain's minimum gas balance.
    ///
    /// Any failure to establish the balance makes the wallet unavailable.
    pub async fn is_available(&self, chain: ChainIdentifier, wallet: Address) -> bool {
        if self.is_busy(chain, wallet) {
            return false;
        }
        let Some((balance, minimum)) = self.balance_and_minimum(chain, wallet).await else {
            return false;
        };
        !self.is_busy(chain, wallet) && balance >= minimum
    }

    /// Whether `wallet` is idle but below the chain's minimum gas balance.
    pub async fn should_top_up(&self, chain: ChainIdentifier, wallet: Address) -> bool {
        if self.is_busy(chain, wallet) {
            return false;
        }
        self.balance_and_minimum(chain, wallet)
            .await
            .is_some_and(|(balance, minimum)| !self.is_busy(chain, wallet) && balance < minimum)
    }

    /// Returns the available wallets among `wallets`, keeping their order.
    pub async fn list_available(
        &self,
        chain: ChainIdentifier,
        wallets: &[RelayerWallet],
    ) -> Vec<RelayerWallet> {
        let available =
            join_all(wallets.iter().map(|wallet| self.is_available(chain, wallet.address()))).await;
        wallets
            .iter()
            .zip(available)
            .filter_map(|(wallet, available)| available.then(|| wallet.clone()))
            .collect()
    }

    /// Marks the first available wallet Busy and returns a guard releasing it on drop.
    #[instrument(skip(self, wallets), fields(%chain))]
    pub async fn acquire(
        &self,
        chain: ChainIdentifier,
        wallets: &[RelayerWallet],
    ) -> Result<BusyWallet, AdmissionError> {
        for wallet in self.list_available(chain, wallets).await {
            if self.mark_busy(chain, wallet.address()) {
                debug!(wallet = %wallet.address(), "Acquired wallet");
                counter!("relayer_wallet_admissions_total", "outcome" => "acquired").increment(1);
                return Ok(BusyWallet { wallet, chain, availability: self.clone() });
            }
        }

        counter!("relayer_wallet_admissions_total", "outcome" => "unavailable").increment(1);
        Err(AdmissionError::NoAvailableWallet(chain))
    }

    /// Marks every wallet of `chain` Available.
    pub fn reset(&self, chain: ChainIdentifier) {
        self.busy.retain(|(busy_chain, _), _| *busy_chain != chain);
    }

    async fn balance_and_minimum(
        &self,
        chain: ChainIdentifier,
        wallet: Address,
    ) -> Option<(U256, U256)> {
        let Some(network) = self.config.network(chain) else {
            warn!(%chain, %wallet, "Wallet queried on an unconfigured chain");
            return None;
        };
        let minimum = network
            .gas_token
            .minimum_balance_wei()
            .inspect_err(|err| warn!(%chain, %err, "Invalid minimum balance for availability"))
            .ok()?;
        let balance = self
            .balances
            .get_balance(chain, wallet)
            .await
            .inspect_err(|err| warn!(%chain, %wallet, %err, "Could not read wallet balance"))
            .ok()?;
        Some((balance, minimum))
    }
}

/// A wallet held Busy on a chain. Dropping the guard marks it Available again.
#[derive(Debug)]
pub struct BusyWallet {
    wallet: RelayerWallet,
    chain: ChainIdentifier,
    availability: WalletAvailability,
}

impl BusyWallet {
    /// The chain the wallet is held on.
    pub fn chain(&self) -> ChainIdentifier {
        self.chain
    }
}

impl Deref for BusyWallet {
    type Target = RelayerWallet;

    fn deref(&self) -> &Self::Target {
        &self.wallet
    }
}

impl Drop for BusyWallet {
    fn drop(&mut self) {
        self.availability.mark_available(self.chain, self.wallet.address());
    }
}
