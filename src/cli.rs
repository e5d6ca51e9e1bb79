//! # Relayer CLI
use crate::{config::RelayerConfig, spawn::try_spawn_with_args};
use alloy::signers::local::coins_bip39::{English, Mnemonic};
use clap::Parser;
use std::{path::PathBuf, time::Duration};
use tracing::info;
use url::Url;

/// Relays shielded transfers, charging fees in ERC20 tokens.
#[derive(Debug, Parser)]
#[command(author, about = "Shielded relayer", long_about = None)]
pub struct Args {
    /// The configuration file.
    ///
    /// If missing, a default one will be used and stored in the working directory under
    /// `relayer.yaml`.
    #[arg(long, value_name = "CONFIG", env = "RELAYER_CONFIG", default_value = "relayer.yaml")]
    pub config: PathBuf,
    /// The mnemonic to derive relayer wallets from.
    #[arg(long, value_name = "MNEMONIC", env = "RELAYER_MNEMONIC")]
    pub mnemonic: Mnemonic<English>,
    /// The number of wallets to derive from the mnemonic.
    #[arg(long = "num-wallets", value_name = "NUM")]
    pub num_wallets: Option<usize>,
    /// The primary Waku REST bridge.
    #[arg(long = "waku-url", value_name = "URL", env = "RELAYER_WAKU_URL")]
    pub waku_url: Option<Url>,
    /// The backup Waku REST bridge, used for retries.
    #[arg(long = "waku-url-backup", value_name = "URL", env = "RELAYER_WAKU_URL_BACKUP")]
    pub waku_url_backup: Option<Url>,
    /// Delay between two token price refreshes.
    #[arg(long = "price-refresh-delay", value_name = "SECONDS", value_parser = parse_duration_secs)]
    pub price_refresh_delay: Option<Duration>,
}

impl Args {
    /// Run the relayer until ctrl-c.
    pub async fn run(self) -> eyre::Result<()> {
        let config_path = self.config.clone();
        let handle = try_spawn_with_args(self, &config_path).await?;

        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
        handle.shutdown().await;

        Ok(())
    }

    /// Merges [`Args`] values into an existing [`RelayerConfig`] instance.
    pub fn merge_relayer_config(self, config: RelayerConfig) -> RelayerConfig {
        config
            .with_wallets_mnemonic(self.mnemonic)
            .with_num_wallets(self.num_wallets)
            .with_waku_urls(self.waku_url, self.waku_url_backup)
            .with_price_refresh_delay(self.price_refresh_delay)
    }
}

/// Parses a string representing seconds to a [`Duration`].
fn parse_duration_secs(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    let seconds = arg.parse()?;
    Ok(Duration::from_secs(seconds))
}
