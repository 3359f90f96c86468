//! Portfolio performance series.
//!
//! A chart is a walk over every calendar day of the visible window, merging
//! the sorted transactions with the cached daily prices in lockstep. Holdings
//! accumulate as transactions are passed, the price is carried forward over
//! gaps, and emission decides which of the walked days become points: the last
//! priced day of each month for the overview and year views, every priced day
//! for the month view.

use crate::core::cache::PriceCache;
use crate::core::price::PricePoint;
use crate::core::transaction::Transaction;
use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use futures::future::try_join_all;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ZoomLevel {
    #[default]
    Overview,
    Year(i32),
    Month(i32, u32),
}

impl fmt::Display for ZoomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoomLevel::Overview => write!(f, "Overview"),
            ZoomLevel::Year(y) => write!(f, "{y}"),
            ZoomLevel::Month(y, m) => write!(f, "{y}-{m:02}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emission {
    MonthEnd,
    Daily,
}

impl From<ZoomLevel> for Emission {
    fn from(zoom: ZoomLevel) -> Self {
        match zoom {
            ZoomLevel::Overview | ZoomLevel::Year(_) => Emission::MonthEnd,
            ZoomLevel::Month(..) => Emission::Daily,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartDataPoint {
    pub day: NaiveDate,
    pub portfolio_value: Decimal,
    pub total_invested: Decimal,
    pub roi_absolute: Decimal,
    pub roi_percent: Decimal,
    pub cumulative_crypto: Decimal,
    pub invested_equiv_crypto: Decimal,
    pub avg_buy_price: Decimal,
    pub price: Decimal,
}

pub(crate) fn half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

fn roi_percent(roi_absolute: Decimal, invested: Decimal) -> Decimal {
    if invested > Decimal::ZERO {
        half_up(half_up(roi_absolute / invested, 4) * Decimal::ONE_HUNDRED, 2)
    } else {
        Decimal::ZERO
    }
}

impl ChartDataPoint {
    fn for_pair(day: NaiveDate, crypto: Decimal, invested: Decimal, price: Decimal) -> Self {
        let value = crypto * price;
        let roi_absolute = value - invested;
        let invested_equiv_crypto = if price > Decimal::ZERO {
            half_up(invested / price, 8)
        } else {
            Decimal::ZERO
        };
        let avg_buy_price = if crypto > Decimal::ZERO {
            half_up(invested / crypto, 2)
        } else {
            Decimal::ZERO
        };

        ChartDataPoint {
            day,
            portfolio_value: half_up(value, 2),
            total_invested: half_up(invested, 2),
            roi_absolute: half_up(roi_absolute, 2),
            roi_percent: roi_percent(roi_absolute, invested),
            cumulative_crypto: crypto,
            invested_equiv_crypto,
            avg_buy_price,
            price,
        }
    }

    fn for_aggregate(day: NaiveDate, value: Decimal, invested: Decimal) -> Self {
        let roi_absolute = value - invested;
        ChartDataPoint {
            day,
            portfolio_value: half_up(value, 2),
            total_invested: half_up(invested, 2),
            roi_absolute: half_up(roi_absolute, 2),
            roi_percent: roi_percent(roi_absolute, invested),
            cumulative_crypto: Decimal::ZERO,
            invested_equiv_crypto: Decimal::ZERO,
            avg_buy_price: Decimal::ZERO,
            price: Decimal::ZERO,
        }
    }
}

fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

/// Days shown at `zoom`, clamped to the first transaction and today.
/// `None` when nothing of the period is visible.
pub fn visible_period(
    zoom: ZoomLevel,
    first_tx: NaiveDate,
    today: NaiveDate,
) -> Option<(NaiveDate, NaiveDate)> {
    let (period_start, period_end) = match zoom {
        ZoomLevel::Overview => (first_tx, today),
        ZoomLevel::Year(y) => (
            NaiveDate::from_ymd_opt(y, 1, 1)?,
            NaiveDate::from_ymd_opt(y, 12, 31)?,
        ),
        ZoomLevel::Month(y, m) => month_bounds(y, m)?,
    };
    let start = period_start.max(first_tx);
    let end = period_end.min(today);
    (start <= end).then_some((start, end))
}

/// Holdings and resolved price at the end of one walked day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySnapshot {
    pub day: NaiveDate,
    pub crypto: Decimal,
    pub invested: Decimal,
    /// Cached price of the day, or the last one seen in the window.
    pub price: Option<Decimal>,
}

/// Lazy lockstep merge of one pair's transactions and prices over a day range.
///
/// Both slices must be sorted by day. Transactions before `start` are folded
/// in on construction so the first yielded day already carries them.
pub struct DailyWalk<'a> {
    transactions: &'a [&'a Transaction],
    prices: &'a [PricePoint],
    next_day: Option<NaiveDate>,
    end: NaiveDate,
    crypto: Decimal,
    invested: Decimal,
    last_price: Option<Decimal>,
}

impl<'a> DailyWalk<'a> {
    pub fn new(
        transactions: &'a [&'a Transaction],
        prices: &'a [PricePoint],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        let mut walk = DailyWalk {
            transactions,
            prices,
            next_day: (start <= end).then_some(start),
            end,
            crypto: Decimal::ZERO,
            invested: Decimal::ZERO,
            last_price: None,
        };
        walk.consume_transactions(|day| day < start);
        walk
    }

    fn consume_transactions(&mut self, include: impl Fn(NaiveDate) -> bool) {
        while let Some((tx, rest)) = self.transactions.split_first() {
            if !include(tx.day()) {
                break;
            }
            self.crypto += tx.crypto_amount;
            self.invested += tx.fiat_amount;
            self.transactions = rest;
        }
    }

    fn resolve_price(&mut self, day: NaiveDate) -> Option<Decimal> {
        while let Some((point, rest)) = self.prices.split_first() {
            if point.day > day {
                break;
            }
            if point.day == day {
                self.last_price = Some(point.price);
            }
            self.prices = rest;
        }
        self.last_price
    }
}

impl Iterator for DailyWalk<'_> {
    type Item = DaySnapshot;

    fn next(&mut self) -> Option<DaySnapshot> {
        let day = self.next_day?;
        self.next_day = day.succ_opt().filter(|next| *next <= self.end);

        self.consume_transactions(|tx_day| tx_day <= day);
        let price = self.resolve_price(day);
        Some(DaySnapshot {
            day,
            crypto: self.crypto,
            invested: self.invested,
            price,
        })
    }
}

/// Sums several pairs' walks over the same window, day by day. A day is
/// kept when at least one pair has a price for it.
struct AggregateWalk<'a> {
    walks: Vec<DailyWalk<'a>>,
}

#[derive(Debug, Clone, Copy)]
struct AggregateDay {
    day: NaiveDate,
    value: Decimal,
    invested: Decimal,
}

impl Iterator for AggregateWalk<'_> {
    type Item = AggregateDay;

    fn next(&mut self) -> Option<AggregateDay> {
        loop {
            let mut day = None;
            let mut value = Decimal::ZERO;
            let mut invested = Decimal::ZERO;
            let mut priced = false;
            for walk in &mut self.walks {
                let snapshot = walk.next()?;
                day = Some(snapshot.day);
                invested += snapshot.invested;
                if let Some(price) = snapshot.price {
                    value += snapshot.crypto * price;
                    priced = true;
                }
            }
            let day = day?;
            if priced {
                return Some(AggregateDay {
                    day,
                    value,
                    invested,
                });
            }
        }
    }
}

trait Dated {
    fn day(&self) -> NaiveDate;
}

impl Dated for DaySnapshot {
    fn day(&self) -> NaiveDate {
        self.day
    }
}

impl Dated for AggregateDay {
    fn day(&self) -> NaiveDate {
        self.day
    }
}

fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

/// Keeps only the last item of every calendar month.
struct MonthEnds<I: Iterator> {
    inner: I,
    pending: Option<I::Item>,
}

impl<I> Iterator for MonthEnds<I>
where
    I: Iterator,
    I::Item: Dated,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        for item in self.inner.by_ref() {
            match self.pending.take() {
                Some(prev) if !same_month(prev.day(), item.day()) => {
                    self.pending = Some(item);
                    return Some(prev);
                }
                _ => self.pending = Some(item),
            }
        }
        self.pending.take()
    }
}

fn emit<I>(items: I, emission: Emission) -> Vec<I::Item>
where
    I: Iterator,
    I::Item: Dated,
{
    match emission {
        Emission::Daily => items.collect(),
        Emission::MonthEnd => MonthEnds {
            inner: items,
            pending: None,
        }
        .collect(),
    }
}

/// Completed transactions of one fiat (and optionally one asset), in
/// execution order.
fn select<'a>(
    transactions: &'a [Transaction],
    asset: Option<&str>,
    fiat: &str,
) -> Vec<&'a Transaction> {
    let mut selected: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| tx.is_completed() && tx.fiat == fiat && asset.is_none_or(|a| tx.asset == a))
        .collect();
    selected.sort_by_key(|tx| tx.executed_at);
    selected
}

/// Builds chart series from transactions and the price cache. Holds no state
/// between calls, so concurrent and abandoned calls are harmless.
#[derive(Clone)]
pub struct ChartAggregator {
    cache: Arc<dyn PriceCache>,
}

impl ChartAggregator {
    pub fn new(cache: Arc<dyn PriceCache>) -> Self {
        Self { cache }
    }

    /// Series for one pair when `asset` is given, or for every asset bought
    /// with `fiat` otherwise. Without a fiat there is nothing to chart.
    pub async fn calculate(
        &self,
        transactions: &[Transaction],
        asset: Option<&str>,
        fiat: Option<&str>,
        zoom: ZoomLevel,
        today: NaiveDate,
    ) -> Result<Vec<ChartDataPoint>> {
        let Some(fiat) = fiat else {
            return Ok(Vec::new());
        };
        match asset {
            Some(asset) => self.calculate_pair(transactions, asset, fiat, zoom, today).await,
            None => self.calculate_aggregate(transactions, fiat, zoom, today).await,
        }
    }

    async fn calculate_pair(
        &self,
        transactions: &[Transaction],
        asset: &str,
        fiat: &str,
        zoom: ZoomLevel,
        today: NaiveDate,
    ) -> Result<Vec<ChartDataPoint>> {
        let pair_txs = select(transactions, Some(asset), fiat);
        let Some(first) = pair_txs.first().map(|tx| tx.day()) else {
            return Ok(Vec::new());
        };
        let Some((start, end)) = visible_period(zoom, first, today) else {
            debug!("Zoom {zoom} shows nothing for {asset}/{fiat}");
            return Ok(Vec::new());
        };

        let prices = self.cache.price_range(asset, fiat, start, end).await?;
        debug!(
            "Charting {asset}/{fiat} {start}..={end}: {} transactions, {} prices",
            pair_txs.len(),
            prices.len()
        );

        let priced_days =
            DailyWalk::new(&pair_txs, &prices, start, end).filter(|s| s.price.is_some());
        let points = emit(priced_days, zoom.into())
            .into_iter()
            .filter_map(|s| {
                s.price
                    .map(|price| ChartDataPoint::for_pair(s.day, s.crypto, s.invested, price))
            })
            .collect();
        Ok(points)
    }

    async fn calculate_aggregate(
        &self,
        transactions: &[Transaction],
        fiat: &str,
        zoom: ZoomLevel,
        today: NaiveDate,
    ) -> Result<Vec<ChartDataPoint>> {
        let fiat_txs = select(transactions, None, fiat);
        let Some(first) = fiat_txs.first().map(|tx| tx.day()) else {
            return Ok(Vec::new());
        };
        let Some((start, end)) = visible_period(zoom, first, today) else {
            debug!("Zoom {zoom} shows nothing for {fiat} portfolio");
            return Ok(Vec::new());
        };

        let mut assets: Vec<&str> = Vec::new();
        for tx in &fiat_txs {
            if !assets.contains(&tx.asset.as_str()) {
                assets.push(&tx.asset);
            }
        }
        let per_asset_txs: Vec<Vec<&Transaction>> = assets
            .iter()
            .map(|asset| {
                fiat_txs
                    .iter()
                    .copied()
                    .filter(|tx| tx.asset == *asset)
                    .collect()
            })
            .collect();
        let per_asset_prices = try_join_all(
            assets
                .iter()
                .map(|asset| self.cache.price_range(asset, fiat, start, end)),
        )
        .await?;
        debug!(
            "Charting {fiat} portfolio {start}..={end}: {} assets",
            assets.len()
        );

        let walks = per_asset_txs
            .iter()
            .zip(&per_asset_prices)
            .map(|(txs, prices)| DailyWalk::new(txs, prices, start, end))
            .collect();
        let points = emit(AggregateWalk { walks }, zoom.into())
            .into_iter()
            .map(|d| ChartDataPoint::for_aggregate(d.day, d.value, d.invested))
            .collect();
        Ok(points)
    }
}

/// Years with at least one completed transaction, ascending.
pub fn available_years(transactions: &[Transaction]) -> Vec<i32> {
    transactions
        .iter()
        .filter(|tx| tx.is_completed())
        .map(|tx| tx.day().year())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Months (1-12) of `year` with at least one completed transaction.
pub fn available_months(transactions: &[Transaction], year: i32) -> Vec<u32> {
    transactions
        .iter()
        .filter(|tx| tx.is_completed())
        .map(Transaction::day)
        .filter(|day| day.year() == year)
        .map(|day| day.month())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
