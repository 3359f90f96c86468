use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use super::util::{RETRIES, RETRY_DELAY_MS, http_client, with_retry};
use crate::core::price::{PricePoint, RecentPriceProvider};

fn coin_id(asset: &str) -> Option<&'static str> {
    match asset.to_uppercase().as_str() {
        "BTC" => Some("bitcoin"),
        "ETH" => Some("ethereum"),
        "SOL" => Some("solana"),
        "ADA" => Some("cardano"),
        "DOT" => Some("polkadot"),
        "LTC" => Some("litecoin"),
        "XRP" => Some("ripple"),
        "DOGE" => Some("dogecoin"),
        _ => None,
    }
}

fn vs_currency(fiat: &str) -> String {
    match fiat.to_uppercase().as_str() {
        "USDT" => "usd".to_string(),
        other => other.to_lowercase(),
    }
}

/// Recent daily prices from the CoinGecko `market_chart` endpoint.
pub struct CoinGeckoProvider {
    base_url: String,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str) -> Self {
        CoinGeckoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct MarketChartResponse {
    prices: Option<Vec<Vec<f64>>>,
}

/// Buckets `[timestamp_ms, price]` samples by UTC day, keeping the last
/// sample of each day.
fn daily_closes(samples: &[Vec<f64>]) -> Vec<PricePoint> {
    let mut by_day: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for sample in samples {
        let (Some(ts), Some(price)) = (sample.first(), sample.get(1)) else {
            continue;
        };
        let Some(day) = DateTime::from_timestamp_millis(*ts as i64).map(|dt| dt.date_naive())
        else {
            continue;
        };
        if let Some(price) = Decimal::from_f64(*price).filter(|p| *p > Decimal::ZERO) {
            by_day.insert(day, price);
        }
    }
    by_day
        .into_iter()
        .map(|(day, price)| PricePoint::new(day, price))
        .collect()
}

#[async_trait]
impl RecentPriceProvider for CoinGeckoProvider {
    #[instrument(name = "CoinGeckoHistory", skip(self), fields(asset = %asset, fiat = %fiat))]
    async fn daily_history(&self, asset: &str, fiat: &str, days: u32) -> Result<Vec<PricePoint>> {
        let id = coin_id(asset).ok_or_else(|| anyhow!("Unknown asset for CoinGecko: {asset}"))?;
        let url = format!(
            "{}/coins/{}/market_chart?vs_currency={}&days={}&interval=daily",
            self.base_url,
            id,
            vs_currency(fiat),
            days
        );
        debug!("Requesting price history from {}", url);

        let client = http_client()?;
        let response = with_retry(
            || client.get(&url).header("Accept", "application/json").send(),
            RETRIES,
            RETRY_DELAY_MS,
        )
        .await
        .map_err(|e| anyhow!("Request error: {} for {}/{}", e, asset, fiat))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for {}/{}",
                response.status(),
                asset,
                fiat
            ));
        }

        let text = response.text().await?;
        let data: MarketChartResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}/{}: {}", asset, fiat, e))?;

        let points = daily_closes(data.prices.as_deref().unwrap_or_default());
        debug!("Received {} daily prices", points.len());
        Ok(points)
    }
}
