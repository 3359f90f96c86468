//! Daily price types and the upstream provider contracts.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One closing price for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub day: NaiveDate,
    pub price: Decimal,
}

impl PricePoint {
    pub fn new(day: NaiveDate, price: Decimal) -> Self {
        Self { day, price }
    }
}

/// A cached row, keyed by (asset, fiat, day).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPrice {
    pub asset: String,
    pub fiat: String,
    pub day: NaiveDate,
    pub price: Decimal,
    pub fetched_at: DateTime<Utc>,
}

/// A row fetched while its day was still running may be refreshed later.
/// Once fetched after the day closed, it is final.
pub fn is_provisional(day: NaiveDate, fetched_at: DateTime<Utc>) -> bool {
    fetched_at.date_naive() <= day
}

impl DailyPrice {
    pub fn is_provisional(&self) -> bool {
        is_provisional(self.day, self.fetched_at)
    }
}

/// Cheap, low-latency source covering the recent past up to today.
#[async_trait]
pub trait RecentPriceProvider: Send + Sync {
    /// Daily prices for the last `days` days, ending today.
    async fn daily_history(&self, asset: &str, fiat: &str, days: u32) -> Result<Vec<PricePoint>>;
}

/// Deep-history source, capped per call.
#[async_trait]
pub trait HistoricalPriceProvider: Send + Sync {
    /// At most `max_days` daily prices ending at `end_day` (inclusive).
    /// An empty result means the provider has nothing older.
    async fn daily_history_ending_at(
        &self,
        asset: &str,
        fiat: &str,
        end_day: NaiveDate,
        max_days: u32,
    ) -> Result<Vec<PricePoint>>;
}
