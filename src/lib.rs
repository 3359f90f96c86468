pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

pub use crate::core::config;

use crate::cli::chart::ChartOptions;
use crate::core::cache::PriceCache;
use crate::core::config::AppConfig;
use crate::core::session::PortfolioSession;
use crate::core::sync::DailyPriceSync;
use crate::core::transaction::{TransactionSource, YamlLedger};
use crate::providers::{CoinGeckoProvider, CryptoCompareProvider};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Sync,
    Chart(ChartOptions),
    Summary,
}

/// Ledger, cache and sync wired up from one configuration.
struct App {
    config: AppConfig,
    ledger: Arc<dyn TransactionSource>,
    cache: Arc<dyn PriceCache>,
    sync: Arc<DailyPriceSync>,
}

impl App {
    fn from_config(config: AppConfig) -> Result<Self> {
        let ledger_path = config.ledger_path()?;
        debug!("Using ledger {}", ledger_path.display());
        let ledger: Arc<dyn TransactionSource> = Arc::new(YamlLedger::new(ledger_path));
        let cache = store::open_price_cache(&config);
        let sync = Arc::new(DailyPriceSync::new(
            Arc::clone(&ledger),
            Arc::clone(&cache),
            Arc::new(CoinGeckoProvider::new(config.providers.coingecko_url())),
            Arc::new(CryptoCompareProvider::new(config.providers.cryptocompare_url())),
            config.sync.clone(),
        ));
        Ok(App {
            config,
            ledger,
            cache,
            sync,
        })
    }

    fn session(&self) -> PortfolioSession {
        PortfolioSession::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.cache),
            Arc::clone(&self.sync),
        )
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("dcatrack starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    let app = App::from_config(config)?;

    match command {
        AppCommand::Sync => cli::sync::run(&app.sync).await.map(|_| ()),
        AppCommand::Chart(options) => {
            let mut session = app.session();
            cli::chart::run(&mut session, &options, &app.config.fiat).await
        }
        AppCommand::Summary => cli::summary::run(app.ledger.as_ref()).await.map(|_| ()),
    }
}
