use crate::core::cache::PriceCache;
use crate::core::price::{PricePoint, is_provisional};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const PARTITION: &str = "daily_prices";
const SEPARATOR: u8 = 0;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    price: Decimal,
    fetched_at: DateTime<Utc>,
}

/// Price cache persisted in a fjall partition.
///
/// Keys are `asset 0x00 fiat 0x00 day`, with the day as an order-preserving
/// big-endian integer, so a pair's rows are contiguous and sorted by day.
pub struct DiskPriceCache {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskPriceCache {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create cache directory: {}", path.display()))?;
        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open price cache at {}", path.display()))?;
        let partition = keyspace.open_partition(PARTITION, PartitionCreateOptions::default())?;
        Ok(Self {
            keyspace,
            partition,
        })
    }
}

fn pair_prefix(asset: &str, fiat: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(asset.len() + fiat.len() + 2);
    key.extend_from_slice(asset.as_bytes());
    key.push(SEPARATOR);
    key.extend_from_slice(fiat.as_bytes());
    key.push(SEPARATOR);
    key
}

fn day_key(asset: &str, fiat: &str, day: NaiveDate) -> Vec<u8> {
    let ordinal = i64::from(day.num_days_from_ce());
    let mut key = pair_prefix(asset, fiat);
    key.extend_from_slice(&((ordinal as u64) ^ (1 << 63)).to_be_bytes());
    key
}

fn decode_day(key: &[u8]) -> Result<NaiveDate> {
    let tail: [u8; 8] = key
        .get(key.len().saturating_sub(8)..)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| anyhow!("Malformed price cache key"))?;
    let ordinal = (u64::from_be_bytes(tail) ^ (1 << 63)) as i64;
    i32::try_from(ordinal)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| anyhow!("Price cache key holds an invalid day: {ordinal}"))
}

impl DiskPriceCache {
    fn boundary_day(&self, asset: &str, fiat: &str, newest: bool) -> Result<Option<NaiveDate>> {
        let mut rows = self.partition.prefix(pair_prefix(asset, fiat));
        let row = if newest { rows.next_back() } else { rows.next() };
        match row {
            Some(kv) => {
                let (key, _) = kv?;
                Ok(Some(decode_day(&key)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PriceCache for DiskPriceCache {
    async fn latest_day(&self, asset: &str, fiat: &str) -> Result<Option<NaiveDate>> {
        self.boundary_day(asset, fiat, true)
    }

    async fn earliest_day(&self, asset: &str, fiat: &str) -> Result<Option<NaiveDate>> {
        self.boundary_day(asset, fiat, false)
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
        let start = day_key(asset, fiat, from);
        let end = day_key(asset, fiat, to);
        let mut points = Vec::new();
        for kv in self.partition.range(start..=end) {
            let (key, value) = kv?;
            let entry: CacheEntry = serde_json::from_slice(&value)?;
            points.push(PricePoint::new(decode_day(&key)?, entry.price));
        }
        debug!("Cache range {asset}/{fiat} {from}..={to}: {} rows", points.len());
        Ok(points)
    }

    async fn upsert_prices(
        &self,
        asset: &str,
        fiat: &str,
        entries: &[PricePoint],
        fetched_at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut written = 0;
        for entry in entries {
            let key = day_key(asset, fiat, entry.day);
            if let Some(existing) = self.partition.get(&key)? {
                let existing: CacheEntry = serde_json::from_slice(&existing)?;
                if !is_provisional(entry.day, existing.fetched_at) {
                    continue;
                }
            }
            let value = serde_json::to_vec(&CacheEntry {
                price: entry.price,
                fetched_at,
            })?;
            self.partition.insert(key, value)?;
            written += 1;
        }
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!("Cache PUT {asset}/{fiat}: {written} of {} rows", entries.len());
        Ok(written)
    }
}
