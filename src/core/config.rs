use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CryptoCompareProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub coingecko: Option<CoinGeckoProviderConfig>,
    pub cryptocompare: Option<CryptoCompareProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            coingecko: Some(CoinGeckoProviderConfig {
                base_url: "https://api.coingecko.com/api/v3".to_string(),
            }),
            cryptocompare: Some(CryptoCompareProviderConfig {
                base_url: "https://min-api.cryptocompare.com".to_string(),
            }),
        }
    }
}

impl ProvidersConfig {
    pub fn coingecko_url(&self) -> &str {
        self.coingecko
            .as_ref()
            .map_or("https://api.coingecko.com/api/v3", |p| &p.base_url)
    }

    pub fn cryptocompare_url(&self) -> &str {
        self.cryptocompare
            .as_ref()
            .map_or("https://min-api.cryptocompare.com", |p| &p.base_url)
    }
}

/// Tunables for the daily price sync.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Pause after every provider call.
    pub rate_limit_delay_ms: u64,
    /// Per-call cap of the historical provider.
    pub backfill_chunk_days: u32,
    /// Days fetched from the recent provider for a pair with an empty cache.
    pub bootstrap_days: u32,
    pub min_lookback_days: u32,
    pub max_lookback_days: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rate_limit_delay_ms: 1500,
            backfill_chunk_days: 2000,
            bootstrap_days: 365,
            min_lookback_days: 30,
            max_lookback_days: 3650,
        }
    }
}

impl SyncConfig {
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Fiat shown by `chart` when none is given.
    pub fiat: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub ledger_path: Option<String>,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("io", "dcatrack", "dcatrack")
            .context("Could not determine project directories")
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    pub fn ledger_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.ledger_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(self.default_data_path()?.join("ledger.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
