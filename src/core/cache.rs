//! The daily price cache contract.

use crate::core::price::PricePoint;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Durable (asset, fiat, day) -> price store.
///
/// Rows for days that had already closed when they were fetched are final:
/// `upsert_prices` never overwrites them. Provisional rows (fetched on their
/// own day) are replaced. Overlapping upserts are therefore idempotent.
#[async_trait]
pub trait PriceCache: Send + Sync {
    async fn latest_day(&self, asset: &str, fiat: &str) -> Result<Option<NaiveDate>>;

    async fn earliest_day(&self, asset: &str, fiat: &str) -> Result<Option<NaiveDate>>;

    /// Cached prices in `[from, to]`, ascending by day.
    async fn price_range(
        &self,
        asset: &str,
        fiat: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>>;

    /// Returns the number of rows written.
    async fn upsert_prices(
        &self,
        asset: &str,
        fiat: &str,
        entries: &[PricePoint],
        fetched_at: DateTime<Utc>,
    ) -> Result<usize>;
}
