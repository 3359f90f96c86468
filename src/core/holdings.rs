//! Ledger totals: what was bought, where, and how much went in each month.

use crate::core::chart::half_up;
use crate::core::transaction::Transaction;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetHolding {
    pub asset: String,
    pub fiat: String,
    pub total_amount: Decimal,
    pub total_invested: Decimal,
    pub average_price: Decimal,
    pub transaction_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeHolding {
    pub exchange: String,
    pub holdings: Vec<AssetHolding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyPerformance {
    pub year: i32,
    pub month: u32,
    pub fiat: String,
    pub total_invested: Decimal,
    pub transaction_count: usize,
}

impl MonthlyPerformance {
    /// "Jan 2024" style label.
    pub fn label(&self) -> String {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|d| d.format("%b %Y").to_string())
            .unwrap_or_else(|| format!("{}-{:02}", self.year, self.month))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiatTotals {
    pub fiat: String,
    pub total_invested: Decimal,
    pub active_months: usize,
    pub average_monthly_investment: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortfolioSummary {
    pub holdings: Vec<AssetHolding>,
    pub exchanges: Vec<ExchangeHolding>,
    pub monthly: Vec<MonthlyPerformance>,
    pub fiat_totals: Vec<FiatTotals>,
    pub total_transactions: usize,
}

fn average_price(invested: Decimal, amount: Decimal) -> Decimal {
    if amount > Decimal::ZERO {
        half_up(invested / amount, 2)
    } else {
        Decimal::ZERO
    }
}

#[derive(Default)]
struct Totals {
    amount: Decimal,
    invested: Decimal,
    count: usize,
}

impl Totals {
    fn add(&mut self, tx: &Transaction) {
        self.amount += tx.crypto_amount;
        self.invested += tx.fiat_amount;
        self.count += 1;
    }
}

/// Largest investment first.
fn holdings_from<'a>(txs: impl Iterator<Item = &'a Transaction>) -> Vec<AssetHolding> {
    let mut by_pair: BTreeMap<(&str, &str), Totals> = BTreeMap::new();
    for tx in txs {
        by_pair.entry((tx.asset.as_str(), tx.fiat.as_str())).or_default().add(tx);
    }
    let mut holdings: Vec<AssetHolding> = by_pair
        .into_iter()
        .map(|((asset, fiat), totals)| AssetHolding {
            asset: asset.to_string(),
            fiat: fiat.to_string(),
            total_amount: totals.amount,
            total_invested: totals.invested,
            average_price: average_price(totals.invested, totals.amount),
            transaction_count: totals.count,
        })
        .collect();
    holdings.sort_by(|a, b| b.total_invested.cmp(&a.total_invested));
    holdings
}

/// Summarizes the completed transactions of a ledger.
pub fn summarize(transactions: &[Transaction]) -> PortfolioSummary {
    let completed: Vec<&Transaction> = transactions.iter().filter(|tx| tx.is_completed()).collect();

    let mut by_exchange: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
    for tx in completed.iter().copied() {
        by_exchange
            .entry(tx.exchange.as_deref().unwrap_or("unknown"))
            .or_default()
            .push(tx);
    }
    let exchanges = by_exchange
        .into_iter()
        .map(|(exchange, txs)| ExchangeHolding {
            exchange: exchange.to_string(),
            holdings: holdings_from(txs.into_iter()),
        })
        .collect();

    let mut by_month: BTreeMap<(i32, u32, &str), Totals> = BTreeMap::new();
    for tx in completed.iter().copied() {
        let day = tx.day();
        by_month
            .entry((day.year(), day.month(), tx.fiat.as_str()))
            .or_default()
            .add(tx);
    }
    let mut fiat_totals: BTreeMap<&str, (Decimal, usize)> = BTreeMap::new();
    for ((_, _, fiat), totals) in &by_month {
        let entry = fiat_totals.entry(*fiat).or_default();
        entry.0 += totals.invested;
        entry.1 += 1;
    }
    let monthly = by_month
        .into_iter()
        .rev()
        .map(|((year, month, fiat), totals)| MonthlyPerformance {
            year,
            month,
            fiat: fiat.to_string(),
            total_invested: totals.invested,
            transaction_count: totals.count,
        })
        .collect();
    let fiat_totals = fiat_totals
        .into_iter()
        .map(|(fiat, (invested, months))| FiatTotals {
            fiat: fiat.to_string(),
            total_invested: invested,
            active_months: months,
            average_monthly_investment: half_up(invested / Decimal::from(months), 2),
        })
        .collect();

    PortfolioSummary {
        holdings: holdings_from(completed.iter().copied()),
        exchanges,
        monthly,
        fiat_totals,
        total_transactions: completed.len(),
    }
}
