//! Ledger records and the read-only source they come from.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Partial,
}

/// A single executed (or attempted) purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub exchange: Option<String>,
    pub asset: String,
    pub fiat: String,
    pub fiat_amount: Decimal,
    pub crypto_amount: Decimal,
    pub price: Decimal,
    pub status: TransactionStatus,
    pub executed_at: DateTime<Utc>,
}

impl Transaction {
    /// Calendar day of execution. Prices are bucketed by UTC day, so are we.
    pub fn day(&self) -> NaiveDate {
        self.executed_at.date_naive()
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }
}

/// Optional narrowing applied by a [`TransactionSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub asset: Option<String>,
    pub fiat: Option<String>,
    pub exchange: Option<String>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.asset.as_deref().is_none_or(|a| a == tx.asset)
            && self.fiat.as_deref().is_none_or(|f| f == tx.fiat)
            && self
                .exchange
                .as_deref()
                .is_none_or(|e| tx.exchange.as_deref() == Some(e))
    }
}

#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Completed transactions matching `filter`, ascending by execution time.
    async fn completed(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;
}

/// Keeps the completed records matching `filter`, sorted by execution time.
fn select_completed(transactions: &[Transaction], filter: &TransactionFilter) -> Vec<Transaction> {
    let mut selected: Vec<Transaction> = transactions
        .iter()
        .filter(|tx| tx.is_completed() && filter.matches(tx))
        .cloned()
        .collect();
    selected.sort_by_key(|tx| tx.executed_at);
    selected
}

/// Distinct (asset, fiat) pairs in order of first appearance.
pub fn distinct_pairs(transactions: &[Transaction]) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for tx in transactions {
        if !pairs.iter().any(|(a, f)| *a == tx.asset && *f == tx.fiat) {
            pairs.push((tx.asset.clone(), tx.fiat.clone()));
        }
    }
    pairs
}

/// An in-memory ledger, handy for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    transactions: Vec<Transaction>,
}

impl MemoryLedger {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self { transactions }
    }
}

#[async_trait]
impl TransactionSource for MemoryLedger {
    async fn completed(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        Ok(select_completed(&self.transactions, filter))
    }
}

#[derive(Debug, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    transactions: Vec<Transaction>,
}

/// Reads the ledger from a YAML file on every call, so edits are picked up
/// without restarting.
#[derive(Debug, Clone)]
pub struct YamlLedger {
    path: PathBuf,
}

impl YamlLedger {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<Transaction>> {
        if !self.path.exists() {
            debug!("Ledger {} does not exist, treating as empty", self.path.display());
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read ledger file: {}", self.path.display()))?;
        let file: LedgerFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse ledger file: {}", self.path.display()))?;
        debug!("Loaded {} ledger records", file.transactions.len());
        Ok(file.transactions)
    }
}

#[async_trait]
impl TransactionSource for YamlLedger {
    async fn completed(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let transactions = self.load()?;
        Ok(select_completed(&transactions, filter))
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{buy, date};
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_memory_ledger_returns_completed_sorted() {
        let mut failed = buy("BTC", "EUR", date(2024, 1, 3), dec!(100), dec!(0.002));
        failed.status = TransactionStatus::Failed;
        let ledger = MemoryLedger::new(vec![
            buy("BTC", "EUR", date(2024, 1, 5), dec!(100), dec!(0.002)),
            failed,
            buy("BTC", "EUR", date(2024, 1, 1), dec!(100), dec!(0.002)),
        ]);

        let txs = ledger.completed(&TransactionFilter::default()).await.unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].day(), date(2024, 1, 1));
        assert_eq!(txs[1].day(), date(2024, 1, 5));
    }

    #[test]
    fn test_filter_by_exchange_and_pair() {
        let mut tx = buy("ETH", "USD", date(2024, 2, 1), dec!(50), dec!(0.02));
        tx.exchange = Some("kraken".to_string());

        let by_exchange = TransactionFilter {
            exchange: Some("kraken".to_string()),
            ..Default::default()
        };
        assert!(by_exchange.matches(&tx));

        let other_exchange = TransactionFilter {
            exchange: Some("binance".to_string()),
            ..Default::default()
        };
        assert!(!other_exchange.matches(&tx));

        let wrong_fiat = TransactionFilter {
            asset: Some("ETH".to_string()),
            fiat: Some("EUR".to_string()),
            exchange: None,
        };
        assert!(!wrong_fiat.matches(&tx));
    }

    #[test]
    fn test_distinct_pairs_keeps_first_seen_order() {
        let txs = vec![
            buy("ETH", "EUR", date(2024, 1, 1), dec!(1), dec!(1)),
            buy("BTC", "EUR", date(2024, 1, 2), dec!(1), dec!(1)),
            buy("ETH", "EUR", date(2024, 1, 3), dec!(1), dec!(1)),
            buy("BTC", "USD", date(2024, 1, 4), dec!(1), dec!(1)),
        ];
        assert_eq!(
            distinct_pairs(&txs),
            vec![
                ("ETH".to_string(), "EUR".to_string()),
                ("BTC".to_string(), "EUR".to_string()),
                ("BTC".to_string(), "USD".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_yaml_ledger_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.yaml");
        std::fs::write(
            &path,
            r#"
transactions:
  - exchange: coinmate
    asset: BTC
    fiat: EUR
    fiat_amount: "500"
    crypto_amount: "0.01"
    price: "50000"
    status: completed
    executed_at: "2024-03-05T10:00:00Z"
  - asset: BTC
    fiat: EUR
    fiat_amount: "100"
    crypto_amount: "0"
    price: "0"
    status: pending
    executed_at: "2024-03-06T10:00:00Z"
"#,
        )
        .unwrap();

        let ledger = YamlLedger::new(&path);
        let txs = ledger.completed(&TransactionFilter::default()).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].crypto_amount, dec!(0.01));
        assert_eq!(txs[0].exchange.as_deref(), Some("coinmate"));
    }

    #[tokio::test]
    async fn test_yaml_ledger_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = YamlLedger::new(dir.path().join("nope.yaml"));
        let txs = ledger.completed(&TransactionFilter::default()).await.unwrap();
        assert!(txs.is_empty());
    }
}
