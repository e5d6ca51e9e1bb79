//! The relay service: admission, pricing and broadcast of relay requests.

use crate::{
    cache::{FeeCacheId, GasBalanceCache, TokenPriceCache, TtlCache},
    chains::ChainIdentifier,
    config::RelayerConfig,
    constants::TRANSACT_POLL_INTERVAL,
    error::RelayerError,
    networking::{WakuApiClient, WakuRelayMessage, topics},
    periodic::{JobHandle, PeriodicJob, PeriodicTask},
    pricing::{FeeCalculator, FeeQuote, UnitTokenFees, calculate_maximum_gas, estimate_gas_details},
    provider::{ChainProvider, ChainProviders},
    wallets::{RelayerWallet, WalletAvailability},
};
use alloy::{
    network::TransactionBuilder,
    primitives::{Address, TxHash, U256, map::HashMap},
    rpc::types::TransactionRequest,
};
use futures_util::future::join_all;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, info, instrument, warn};

/// A request to relay a transaction, paying `offered_fee` of `fee_token`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    /// Transaction to broadcast. Sender, nonce, gas and fee fields are set by the relayer.
    pub tx: TransactionRequest,
    /// Token the fee is paid in.
    pub fee_token: Address,
    /// Price generation of the fee quote the client used.
    pub fee_cache_id: FeeCacheId,
    /// Fee offered, in token base units.
    pub offered_fee: U256,
}

/// Outcome of a successful relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayReceipt {
    /// Hash of the broadcast transaction.
    pub tx_hash: TxHash,
    /// Wallet the transaction was sent from.
    pub wallet: Address,
    /// Fee required for the transaction.
    pub required_fee: U256,
}

/// Fees a relayer currently charges on a chain, as broadcast to wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBroadcast {
    /// Token base units charged per whole gas token, by token.
    pub fees: HashMap<Address, U256>,
    /// Unix milliseconds after which the fees are no longer honored.
    pub fee_expiration: u64,
    /// Price generation the fees were derived from.
    #[serde(rename = "feesID")]
    pub fees_id: FeeCacheId,
    /// Number of wallets ready to relay.
    pub available_wallets: usize,
}

/// Answer to a relay request, published on the transact response topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactResponse {
    /// Hash of the broadcast transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    /// Why the request was not relayed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Result<RelayReceipt, RelayerError>> for TransactResponse {
    fn from(result: &Result<RelayReceipt, RelayerError>) -> Self {
        match result {
            Ok(receipt) => Self { tx_hash: Some(receipt.tx_hash), error: None },
            Err(err) => Self { tx_hash: None, error: Some(err.to_string()) },
        }
    }
}

/// The relay service.
#[derive(Debug, Clone)]
pub struct Relayer {
    inner: Arc<RelayerInner>,
}

#[derive(Debug)]
struct RelayerInner {
    config: Arc<RelayerConfig>,
    providers: ChainProviders,
    wallets: Vec<RelayerWallet>,
    balances: GasBalanceCache,
    availability: WalletAvailability,
    prices: TokenPriceCache,
    fees: FeeCalculator,
    /// Unit fees broadcast to clients, honored until their expiration.
    published_fees: TtlCache<(ChainIdentifier, FeeCacheId), UnitTokenFees>,
    waku: WakuApiClient,
}

impl Relayer {
    /// Creates a relayer sending from `wallets` and pricing with `prices`.
    pub fn new(
        config: Arc<RelayerConfig>,
        providers: ChainProviders,
        wallets: Vec<RelayerWallet>,
        prices: TokenPriceCache,
        waku: WakuApiClient,
    ) -> Self {
        let balances = GasBalanceCache::new(providers.clone(), config.clone());
        let availability = WalletAvailability::new(balances.clone(), config.clone());
        let fees = FeeCalculator::new(config.clone(), prices.clone());
        Self {
            inner: Arc::new(RelayerInner {
                config,
                providers,
                wallets,
                balances,
                availability,
                prices,
                fees,
                published_fees: TtlCache::new("published_fees"),
                waku,
            }),
        }
    }

    /// The relayer wallets.
    pub fn wallets(&self) -> &[RelayerWallet] {
        &self.inner.wallets
    }

    /// The wallet admission controller.
    pub fn availability(&self) -> &WalletAvailability {
        &self.inner.availability
    }

    /// The gas balance cache.
    pub fn balances(&self) -> &GasBalanceCache {
        &self.inner.balances
    }

    /// The token price cache.
    pub fn prices(&self) -> &TokenPriceCache {
        &self.inner.prices
    }

    /// The Waku bridge client.
    pub fn waku(&self) -> &WakuApiClient {
        &self.inner.waku
    }

    fn provider(&self, chain: ChainIdentifier) -> Result<Arc<dyn ChainProvider>, RelayerError> {
        self.inner.providers.get(chain).ok_or(RelayerError::UnsupportedChain(chain))
    }

    /// Quotes the fee for relaying `tx` on `chain`, paid in `fee_token`.
    #[instrument(skip(self, tx), fields(%chain))]
    pub async fn quote_fee(
        &self,
        chain: ChainIdentifier,
        tx: TransactionRequest,
        fee_token: Address,
    ) -> Result<FeeQuote, RelayerError> {
        let network =
            self.inner.config.network(chain).ok_or(RelayerError::UnsupportedChain(chain))?;
        let provider = self.provider(chain)?;

        let details =
            estimate_gas_details(chain, network.evm_gas_type, provider.as_ref(), tx).await?;
        Ok(self.inner.fees.quote(chain, calculate_maximum_gas(&details), fee_token)?)
    }

    /// Unit fees broadcast under `fee_cache_id` that have not expired yet.
    fn published_fees(
        &self,
        chain: ChainIdentifier,
        fee_cache_id: FeeCacheId,
    ) -> Option<UnitTokenFees> {
        self.inner
            .published_fees
            .get(&(chain, fee_cache_id), self.inner.config.broadcast.fee_expiration)
            .ok()
    }

    /// Relays `request` on `chain` from an available wallet.
    ///
    /// The fee is checked against the fees broadcast under the request's `fee_cache_id` while
    /// they have not expired, or else against the current prices of that same generation.
    /// The wallet is held busy until the transaction is broadcast, and released on every path.
    #[instrument(skip(self, request), fields(%chain, fee_token = %request.fee_token))]
    pub async fn relay(
        &self,
        chain: ChainIdentifier,
        request: RelayRequest,
    ) -> Result<RelayReceipt, RelayerError> {
        let RelayRequest { tx, fee_token, fee_cache_id, offered_fee } = request;
        let published = self.published_fees(chain, fee_cache_id);
        if published.is_none() && !self.inner.prices.is_current(chain, fee_cache_id) {
            return Err(RelayerError::StaleFeeQuote(chain));
        }
        let network =
            self.inner.config.network(chain).ok_or(RelayerError::UnsupportedChain(chain))?;
        let provider = self.provider(chain)?;

        let wallet = self.inner.availability.acquire(chain, &self.inner.wallets).await?;
        let tx = tx.with_from(wallet.address());

        let details =
            estimate_gas_details(chain, network.evm_gas_type, provider.as_ref(), tx.clone()).await?;
        let maximum_gas = calculate_maximum_gas(&details);
        let quote = match &published {
            Some(unit_fees) => {
                self.inner.fees.quote_from_unit_fees(chain, maximum_gas, fee_token, unit_fees)?
            }
            None => {
                let quote = self.inner.fees.quote(chain, maximum_gas, fee_token)?;
                if quote.fee_cache_id != fee_cache_id {
                    return Err(RelayerError::StaleFeeQuote(chain));
                }
                quote
            }
        };
        if offered_fee < quote.amount {
            return Err(RelayerError::FeeTooLow { required: quote.amount, offered: offered_fee });
        }

        let nonce = provider.transaction_count(wallet.address()).await?;
        let encoded = wallet.sign_transaction(chain.id.id(), nonce, tx, &details).await?;
        let tx_hash = provider.send_raw_transaction(encoded).await?;
        info!(%tx_hash, wallet = %wallet.address(), nonce, "Relayed transaction");
        counter!("relayer_relayed_transactions_total", "chain" => chain.to_string()).increment(1);

        if let Err(err) = self.inner.balances.refresh(chain, wallet.address()).await {
            warn!(%err, wallet = %wallet.address(), "Failed to refresh balance after relay");
        }

        Ok(RelayReceipt { tx_hash, wallet: wallet.address(), required_fee: quote.amount })
    }

    /// Current fees of `chain`, valid for the configured fee expiration.
    ///
    /// The fees are recorded so that relay requests quoting them are honored until they expire.
    pub async fn fee_broadcast(
        &self,
        chain: ChainIdentifier,
    ) -> Result<FeeBroadcast, RelayerError> {
        let unit_fees = self.inner.fees.all_unit_token_fees(chain)?;
        let available_wallets =
            self.inner.availability.list_available(chain, &self.inner.wallets).await.len();
        let expiration = self.inner.config.broadcast.fee_expiration;
        let fee_expiration = unix_millis().saturating_add(expiration.as_millis() as u64);

        self.inner.published_fees.evict_expired(expiration);
        self.inner.published_fees.set((chain, unit_fees.fee_cache_id), unit_fees.clone());

        Ok(FeeBroadcast {
            fees: unit_fees.fees,
            fee_expiration,
            fees_id: unit_fees.fee_cache_id,
            available_wallets,
        })
    }

    /// Publishes the current fees of `chain` on its fees topic.
    #[instrument(skip(self), fields(%chain))]
    pub async fn publish_fees(&self, chain: ChainIdentifier) -> Result<bool, RelayerError> {
        let broadcast = self.fee_broadcast(chain).await?;
        debug!(fees_id = %broadcast.fees_id, tokens = broadcast.fees.len(), "Publishing fees");
        let payload = serde_json::to_vec(&broadcast).map_err(eyre::Error::from)?;

        let message = WakuRelayMessage::new(topics::fees(chain.id), payload)
            .with_timestamp(unix_millis() as i64);
        Ok(self.inner.waku.publish(&message, &self.inner.config.waku.pubsub_topic).await?)
    }

    /// Relays every pending request of every chain and publishes the outcomes.
    ///
    /// The node hands out each message once, so the pubsub topic is read a single time and each
    /// request is routed to its chain by content topic. Returns the number of requests relayed.
    /// Undecodable requests are skipped.
    #[instrument(skip(self))]
    pub async fn handle_transact_messages(&self) -> Result<usize, RelayerError> {
        let transact_topics = self
            .inner
            .config
            .chains()
            .map(|chain| (topics::transact(chain.id), chain))
            .collect::<HashMap<_, _>>();
        let content_topics = transact_topics.keys().cloned().collect::<Vec<_>>();
        let pubsub_topic = &self.inner.config.waku.pubsub_topic;
        let messages = self.inner.waku.get_messages(pubsub_topic, &content_topics).await?;

        let requests = messages.iter().filter_map(|message| {
            let chain = *transact_topics.get(&message.content_topic)?;
            serde_json::from_slice::<RelayRequest>(&message.payload)
                .inspect_err(|err| warn!(%chain, %err, "Skipping undecodable relay request"))
                .ok()
                .map(|request| (chain, request))
        });
        let results = join_all(requests.map(|(chain, request)| async move {
            let result = self.relay(chain, request).await;
            self.respond(chain, &result).await;
            result
        }))
        .await;

        Ok(results.iter().filter(|result| result.is_ok()).count())
    }

    async fn respond(&self, chain: ChainIdentifier, result: &Result<RelayReceipt, RelayerError>) {
        if let Err(err) = result {
            debug!(%err, "Relay request rejected");
        }
        let response = TransactResponse::from(result);
        let payload = match serde_json::to_vec(&response) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "Failed to encode transact response");
                return;
            }
        };

        let message = WakuRelayMessage::new(topics::transact_response(chain.id), payload)
            .with_timestamp(unix_millis() as i64);
        let pubsub_topic = &self.inner.config.waku.pubsub_topic;
        if let Err(err) = self.inner.waku.publish(&message, pubsub_topic).await {
            warn!(%err, "Failed to publish transact response");
        }
    }

    /// Launches the fee broadcast loop.
    pub fn spawn_fee_broadcaster(&self) -> JobHandle {
        PeriodicJob::launch(FeeBroadcaster(self.clone()), self.inner.config.broadcast.interval)
    }

    /// Launches the loop relaying incoming requests.
    pub fn spawn_transact_listener(&self) -> JobHandle {
        PeriodicJob::launch(TransactListener(self.clone()), TRANSACT_POLL_INTERVAL)
    }
}

/// Publishes the fees of every chain.
#[derive(Debug)]
struct FeeBroadcaster(Relayer);

impl PeriodicTask for FeeBroadcaster {
    async fn run(&self) -> Result<(), RelayerError> {
        let chains = self.0.inner.config.chains().collect::<Vec<_>>();
        let results = join_all(chains.iter().map(|chain| self.0.publish_fees(*chain))).await;
        for (chain, result) in chains.into_iter().zip(results) {
            if let Err(err) = result {
                warn!(%chain, %err, "Failed to publish fees");
            }
        }
        Ok(())
    }
}

/// Relays incoming requests of every chain.
#[derive(Debug)]
struct TransactListener(Relayer);

impl PeriodicTask for TransactListener {
    async fn run(&self) -> Result<(), RelayerError> {
        match self.0.handle_transact_messages().await {
            Ok(0) => {}
            Ok(relayed) => debug!(relayed, "Handled relay requests"),
            Err(err) => warn!(%err, "Failed to handle relay requests"),
        }
        Ok(())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
