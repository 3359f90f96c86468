//! Two-phase daily price sync.
//!
//! Every run first closes the gap between the newest cached day and today
//! using the cheap recent provider. It then extends the cache backwards in
//! bounded chunks from the historical provider until the wanted lookback is
//! covered or the provider runs out of data. Past days never change once
//! cached, so the backfill is a one-time cost per pair and the min/max
//! cached days are the only cursor needed to resume after a restart.

use crate::core::cache::PriceCache;
use crate::core::config::SyncConfig;
use crate::core::price::{HistoricalPriceProvider, PricePoint, RecentPriceProvider};
use crate::core::transaction::{Transaction, TransactionFilter, TransactionSource, distinct_pairs};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};

/// What the forward phase did for one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Empty cache, fetched the bootstrap window.
    Bootstrapped { stored: usize },
    /// Fetched the missing days up to today.
    GapFilled { stored: usize },
    /// Cache already reaches yesterday or today.
    UpToDate,
    /// Provider failed or returned nothing; retried next run.
    Unavailable { reason: String },
}

/// Why the backfill loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    /// Nothing to do: the cache already covers the wanted lookback.
    Covered,
    /// No cached anchor to extend backwards from.
    NoAnchor,
    /// Reached the desired start day.
    Completed,
    /// Provider returned an empty chunk; older history does not exist there.
    Exhausted,
    /// Provider failed; resumes from the cached boundary next run.
    Unavailable { reason: String },
    /// A chunk did not move the boundary backwards.
    Stalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSyncReport {
    pub asset: String,
    pub fiat: String,
    pub desired_start: NaiveDate,
    pub forward: ForwardOutcome,
    pub backfill: BackfillOutcome,
    pub backfill_calls: usize,
    pub backfill_stored: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairFailure {
    pub asset: String,
    pub fiat: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pairs: Vec<PairSyncReport>,
    pub failures: Vec<PairFailure>,
}

impl SyncReport {
    pub fn synced_count(&self) -> usize {
        self.pairs.len()
    }
}

/// First day the cache should reach back to for a pair whose oldest
/// transaction is on `earliest_tx`.
pub fn desired_start_day(
    earliest_tx: Option<NaiveDate>,
    today: NaiveDate,
    settings: &SyncConfig,
) -> NaiveDate {
    let lookback = match earliest_tx {
        Some(first) => (today - first).num_days().clamp(
            i64::from(settings.min_lookback_days),
            i64::from(settings.max_lookback_days),
        ),
        None => i64::from(settings.bootstrap_days),
    };
    today - chrono::Duration::days(lookback)
}

pub struct DailyPriceSync {
    ledger: Arc<dyn TransactionSource>,
    cache: Arc<dyn PriceCache>,
    recent: Arc<dyn RecentPriceProvider>,
    historical: Arc<dyn HistoricalPriceProvider>,
    settings: SyncConfig,
}

impl DailyPriceSync {
    pub fn new(
        ledger: Arc<dyn TransactionSource>,
        cache: Arc<dyn PriceCache>,
        recent: Arc<dyn RecentPriceProvider>,
        historical: Arc<dyn HistoricalPriceProvider>,
        settings: SyncConfig,
    ) -> Self {
        Self {
            ledger,
            cache,
            recent,
            historical,
            settings,
        }
    }

    /// Syncs every pair with completed transactions, using the wall clock.
    pub async fn sync(&self) -> Result<SyncReport> {
        let now = Utc::now();
        self.sync_at(now.date_naive(), now).await
    }

    /// Syncs every pair as if `today` were the current day.
    ///
    /// Pairs run one after another to share the providers' rate limit. A
    /// failing pair is recorded and does not stop the others.
    pub async fn sync_at(&self, today: NaiveDate, now: DateTime<Utc>) -> Result<SyncReport> {
        let transactions = self.ledger.completed(&TransactionFilter::default()).await?;
        let mut report = SyncReport::default();
        if transactions.is_empty() {
            debug!("No completed transactions, nothing to sync");
            return Ok(report);
        }

        for (asset, fiat) in distinct_pairs(&transactions) {
            let earliest_tx = earliest_day(&transactions, &asset, &fiat);
            let span = info_span!("sync_pair", asset = %asset, fiat = %fiat);
            match self
                .sync_pair(&asset, &fiat, earliest_tx, today, now)
                .instrument(span)
                .await
            {
                Ok(pair) => report.pairs.push(pair),
                Err(e) => {
                    warn!("Error syncing prices for {asset}/{fiat}: {e:#}");
                    report.failures.push(PairFailure {
                        asset,
                        fiat,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        info!(
            "Price sync finished: {} pairs synced, {} failed",
            report.pairs.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn sync_pair(
        &self,
        asset: &str,
        fiat: &str,
        earliest_tx: Option<NaiveDate>,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<PairSyncReport> {
        let desired_start = desired_start_day(earliest_tx, today, &self.settings);
        let forward = self.forward_sync(asset, fiat, today, now).await?;
        let (backfill, backfill_calls, backfill_stored) =
            self.backfill(asset, fiat, desired_start, now).await?;

        Ok(PairSyncReport {
            asset: asset.to_string(),
            fiat: fiat.to_string(),
            desired_start,
            forward,
            backfill,
            backfill_calls,
            backfill_stored,
        })
    }

    async fn forward_sync(
        &self,
        asset: &str,
        fiat: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ForwardOutcome> {
        let latest = self.cache.latest_day(asset, fiat).await?;
        let days = match latest {
            None => {
                debug!("Bootstrap: fetching last {} days", self.settings.bootstrap_days);
                self.settings.bootstrap_days
            }
            Some(latest) if latest < yesterday(today) => {
                let gap = (today - latest).num_days() + 1;
                debug!("Forward sync: fetching {gap} days gap");
                u32::try_from(gap).unwrap_or(u32::MAX)
            }
            Some(_) => return Ok(ForwardOutcome::UpToDate),
        };

        let fetched = self.recent.daily_history(asset, fiat, days).await;
        self.pause().await;

        let prices = match fetched {
            Ok(prices) if !prices.is_empty() => prices,
            Ok(_) => {
                warn!("Forward sync: no data returned");
                return Ok(ForwardOutcome::Unavailable {
                    reason: "no data returned".to_string(),
                });
            }
            Err(e) => {
                warn!("Forward sync failed: {e:#}");
                return Ok(ForwardOutcome::Unavailable {
                    reason: format!("{e:#}"),
                });
            }
        };

        let stored = self.cache.upsert_prices(asset, fiat, &prices, now).await?;
        debug!("Forward sync: stored {stored} of {} days", prices.len());
        Ok(match latest {
            None => ForwardOutcome::Bootstrapped { stored },
            Some(_) => ForwardOutcome::GapFilled { stored },
        })
    }

    async fn backfill(
        &self,
        asset: &str,
        fiat: &str,
        desired_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(BackfillOutcome, usize, usize)> {
        let Some(earliest) = self.cache.earliest_day(asset, fiat).await? else {
            return Ok((BackfillOutcome::NoAnchor, 0, 0));
        };
        if earliest <= desired_start + chrono::Days::new(1) {
            return Ok((BackfillOutcome::Covered, 0, 0));
        }
        debug!("Backfill: earliest cached={earliest}, desired={desired_start}");

        let mut chunk_end = yesterday(earliest);
        let mut calls = 0;
        let mut stored = 0;
        while chunk_end >= desired_start {
            let remaining = (chunk_end - desired_start).num_days() + 1;
            let limit = u32::try_from(remaining)
                .unwrap_or(u32::MAX)
                .min(self.settings.backfill_chunk_days);

            debug!("Backfill chunk: {limit} days ending at {chunk_end}");
            calls += 1;
            let fetched = self
                .historical
                .daily_history_ending_at(asset, fiat, chunk_end, limit)
                .await;
            self.pause().await;

            let prices = match fetched {
                Ok(prices) => prices,
                Err(e) => {
                    warn!("Backfill chunk failed: {e:#}");
                    return Ok((
                        BackfillOutcome::Unavailable {
                            reason: format!("{e:#}"),
                        },
                        calls,
                        stored,
                    ));
                }
            };
            let Some(oldest) = prices.iter().map(|p: &PricePoint| p.day).min() else {
                info!("Backfill chunk: no data returned, accepting partial history");
                return Ok((BackfillOutcome::Exhausted, calls, stored));
            };

            stored += self.cache.upsert_prices(asset, fiat, &prices, now).await?;
            debug!("Backfill chunk: stored {} days (earliest={oldest})", prices.len());

            let next_end = yesterday(oldest);
            if next_end >= chunk_end {
                warn!("Backfill chunk did not reach past {chunk_end}, stopping");
                return Ok((BackfillOutcome::Stalled, calls, stored));
            }
            chunk_end = next_end;
        }

        Ok((BackfillOutcome::Completed, calls, stored))
    }

    async fn pause(&self) {
        let delay = self.settings.rate_limit_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn yesterday(day: NaiveDate) -> NaiveDate {
    day.pred_opt().unwrap_or(day)
}

fn earliest_day(transactions: &[Transaction], asset: &str, fiat: &str) -> Option<NaiveDate> {
    transactions
        .iter()
        .filter(|tx| tx.asset == asset && tx.fiat == fiat)
        .map(Transaction::day)
        .min()
}
