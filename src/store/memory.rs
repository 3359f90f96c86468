use crate::core::cache::PriceCache;
use crate::core::price::{DailyPrice, PricePoint, is_provisional};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct CachedPrice {
    price: Decimal,
    fetched_at: DateTime<Utc>,
}

type PairKey = (String, String);

/// In-memory price cache, one ordered map per pair.
#[derive(Clone, Default)]
pub struct MemoryPriceCache {
    inner: Arc<Mutex<HashMap<PairKey, BTreeMap<NaiveDate, CachedPrice>>>>,
}

impl MemoryPriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full row lookup, mostly for assertions.
    pub async fn get(&self, asset: &str, fiat: &str, day: NaiveDate) -> Option<DailyPrice> {
        let cache = self.inner.lock().await;
        cache
            .get(&(asset.to_string(), fiat.to_string()))
            .and_then(|days| days.get(&day))
            .map(|cached| DailyPrice {
                asset: asset.to_string(),
                fiat: fiat.to_string(),
                day,
                price: cached.price,
                fetched_at: cached.fetched_at,
            })
    }

    pub async fn len(&self) -> usize {
        let cache = self.inner.lock().await;
        cache.values().map(BTreeMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PriceCache for MemoryPriceCache {
    async fn latest_day(&self, asset: &str, fiat: &str) -> Result<Option<NaiveDate>> {
        let cache = self.inner.lock().await;
        Ok(cache
            .get(&(asset.to_string(), fiat.to_string()))
            .and_then(|days| days.keys().next_back().copied()))
    }

    async fn earliest_day(&self, asset: &str, fiat: &str) -> Result<Option<NaiveDate>> {
        let cache = self.inner.lock().await;
        Ok(cache
            .get(&(asset.to_string(), fiat.to_string()))
            .and_then(|days| days.keys().next().copied()))
    }

    async fn price_range(
        &self,
        asset: &str,
        fiat: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>> {
        if from > to {
            return Ok(Vec::new());
        }
        let cache = self.inner.lock().await;
        let points = cache
            .get(&(asset.to_string(), fiat.to_string()))
            .map(|days| {
                days.range(from..=to)
                    .map(|(day, cached)| PricePoint::new(*day, cached.price))
                    .collect()
            })
            .unwrap_or_default();
        Ok(points)
    }

    async fn upsert_prices(
        &self,
        asset: &str,
        fiat: &str,
        entries: &[PricePoint],
        fetched_at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut cache = self.inner.lock().await;
        let days = cache
            .entry((asset.to_string(), fiat.to_string()))
            .or_default();

        let mut written = 0;
        for entry in entries {
            if let Some(existing) = days.get(&entry.day) {
                if !is_provisional(entry.day, existing.fetched_at) {
                    continue;
                }
            }
            days.insert(
                entry.day,
                CachedPrice {
                    price: entry.price,
                    fetched_at,
                },
            );
            written += 1;
        }
        debug!("Cache PUT {asset}/{fiat}: {written} of {} rows", entries.len());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn at(d: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_empty_cache_has_no_bounds() {
        let cache = MemoryPriceCache::new();
        assert!(cache.latest_day("BTC", "EUR").await.unwrap().is_none());
        assert!(cache.earliest_day("BTC", "EUR").await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_bounds_and_range() {
        let cache = MemoryPriceCache::new();
        let entries = [
            PricePoint::new(day(3), dec!(300)),
            PricePoint::new(day(1), dec!(100)),
            PricePoint::new(day(2), dec!(200)),
        ];
        cache.upsert_prices("BTC", "EUR", &entries, at(10, 0)).await.unwrap();

        assert_eq!(cache.earliest_day("BTC", "EUR").await.unwrap(), Some(day(1)));
        assert_eq!(cache.latest_day("BTC", "EUR").await.unwrap(), Some(day(3)));

        let range = cache.price_range("BTC", "EUR", day(2), day(5)).await.unwrap();
        assert_eq!(
            range,
            vec![PricePoint::new(day(2), dec!(200)), PricePoint::new(day(3), dec!(300))]
        );

        // Pairs are disjoint.
        assert!(cache.latest_day("BTC", "USD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_days_are_never_overwritten() {
        let cache = MemoryPriceCache::new();
        cache
            .upsert_prices("BTC", "EUR", &[PricePoint::new(day(1), dec!(100))], at(2, 0))
            .await
            .unwrap();

        let written = cache
            .upsert_prices("BTC", "EUR", &[PricePoint::new(day(1), dec!(999))], at(5, 0))
            .await
            .unwrap();

        assert_eq!(written, 0);
        let row = cache.get("BTC", "EUR", day(1)).await.unwrap();
        assert_eq!(row.price, dec!(100));
        assert_eq!(row.fetched_at, at(2, 0));
    }

    #[tokio::test]
    async fn test_provisional_day_is_refreshed() {
        let cache = MemoryPriceCache::new();
        cache
            .upsert_prices("BTC", "EUR", &[PricePoint::new(day(4), dec!(100))], at(4, 9))
            .await
            .unwrap();
        cache
            .upsert_prices("BTC", "EUR", &[PricePoint::new(day(4), dec!(110))], at(5, 1))
            .await
            .unwrap();

        let row = cache.get("BTC", "EUR", day(4)).await.unwrap();
        assert_eq!(row.price, dec!(110));
        assert!(!row.is_provisional());
    }
}
