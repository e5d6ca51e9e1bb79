//! Relayer spawn utilities.
use crate::{
    cache::TokenPriceCache,
    cli::Args,
    config::RelayerConfig,
    networking::{WakuApiClient, topics},
    periodic::JobHandle,
    price::{CoinGecko, TokenPricePoller},
    provider::{ChainProvider, ChainProviders},
    relayer::Relayer,
    wallets::RelayerWallet,
};
use alloy::{
    providers::{Provider, ProviderBuilder},
    rpc::client::ClientBuilder,
    transports::layers::RetryBackoffLayer,
};
use eyre::{OptionExt, WrapErr};
use futures_util::future::join_all;
use itertools::Itertools;
use std::{path::Path, sync::Arc};
use tracing::{info, warn};

/// [`RetryBackoffLayer`] used for chain providers.
///
/// We are allowing max 10 retries with a backoff of 800ms. The CU/s is set to max value to avoid
/// any throttling.
const RETRY_LAYER: RetryBackoffLayer = RetryBackoffLayer::new(10, 800, u64::MAX);

/// Context returned once the relayer is launched.
#[derive(Debug)]
pub struct RelayerHandle {
    /// The relay service.
    pub relayer: Relayer,
    /// Token price poller.
    pub price_poller: JobHandle,
    /// Fee broadcaster.
    pub fee_broadcaster: JobHandle,
    /// Relay request listener.
    pub transact_listener: JobHandle,
    /// Pubsub topic the relayer is subscribed to.
    pub pubsub_topic: String,
}

impl RelayerHandle {
    /// Stops every background job and unsubscribes from the relayer topics.
    pub async fn shutdown(self) {
        self.transact_listener.shutdown().await;
        self.fee_broadcaster.shutdown().await;
        self.price_poller.shutdown().await;

        if let Err(err) = self.relayer.waku().unsubscribe(&[self.pubsub_topic]).await {
            warn!(%err, "Failed to unsubscribe from the pubsub topic");
        }
    }
}

/// Attempts to spawn the relayer using CLI arguments and a configuration file.
///
/// A missing configuration file is created from the defaults merged with the CLI values.
pub async fn try_spawn_with_args<P: AsRef<Path>>(
    args: Args,
    config_path: P,
) -> eyre::Result<RelayerHandle> {
    let config = if !config_path.as_ref().exists() {
        let config = args.merge_relayer_config(RelayerConfig::default());
        config.save_to_file(&config_path)?;
        config
    } else {
        // File exists: load and override with CLI values.
        args.merge_relayer_config(RelayerConfig::load_from_file(&config_path)?)
    };

    try_spawn(config).await
}

/// Spawns the relayer using the provided [`RelayerConfig`].
pub async fn try_spawn(config: RelayerConfig) -> eyre::Result<RelayerHandle> {
    config.validate()?;
    let config = Arc::new(config);

    // derive wallets
    let mnemonic =
        config.secrets.wallets_mnemonic.as_ref().ok_or_eyre("missing wallets mnemonic")?;
    let wallets = RelayerWallet::derive_from_mnemonic(mnemonic, config.wallets.num_wallets)?;

    // construct providers
    let providers = config
        .chains()
        .filter_map(|chain| {
            let network = config.network(chain)?;
            let client =
                ClientBuilder::default().layer(RETRY_LAYER.clone()).http(network.rpc_url.clone());
            let provider = ProviderBuilder::new().connect_client(client).erased();
            Some((chain, Arc::new(provider) as Arc<dyn ChainProvider>))
        })
        .collect::<ChainProviders>();

    // start price poller
    let prices = TokenPriceCache::new(config.clone());
    let source = CoinGecko::new(
        config.token_prices.coingecko_api_url.clone(),
        config.token_prices.coingecko_api_key.clone(),
    );
    let price_poller =
        TokenPricePoller::new(config.clone(), prices.clone(), Arc::new(source)).spawn();

    // connect to waku
    let waku = WakuApiClient::new(&config.waku)?;
    match waku.debug_info().await {
        Ok(addresses) => info!(addresses = %addresses.iter().join(", "), "Connected to waku node"),
        Err(err) => warn!(%err, "Waku node unreachable, continuing"),
    }
    let pubsub_topic = config.waku.pubsub_topic.clone();
    waku.subscribe(&[pubsub_topic.clone()])
        .await
        .wrap_err_with(|| format!("Failed to subscribe to {pubsub_topic}"))?;

    let relayer = Relayer::new(config.clone(), providers, wallets, prices, waku);

    // warm up balances
    let chains = config.chains().collect::<Vec<_>>();
    let addresses = relayer.wallets().iter().map(RelayerWallet::address).collect::<Vec<_>>();
    join_all(chains.iter().map(|chain| relayer.balances().refresh_all(*chain, &addresses))).await;
    for chain in &chains {
        for wallet in relayer.wallets() {
            if relayer.availability().should_top_up(*chain, wallet.address()).await {
                warn!(%chain, wallet = %wallet.address(), "Wallet below minimum gas balance");
            }
        }
    }

    let fee_broadcaster = relayer.spawn_fee_broadcaster();
    let transact_listener = relayer.spawn_transact_listener();

    info!(
        chains = %chains.iter().join(", "),
        wallets = %addresses.iter().join(", "),
        fee_topics = %chains.iter().map(|chain| topics::fees(chain.id)).join(", "),
        "Started relayer"
    );

    Ok(RelayerHandle { relayer, price_poller, fee_broadcaster, transact_listener, pubsub_topic })
}
