//! Portfolio view state: which chart is shown, at what zoom, and keeping it
//! current while prices sync in the background.
//!
//! Every chart request takes a new generation number. A result is published
//! only if no newer request started while it was computing, so a slow
//! computation for an old selection can never overwrite a newer one.

use crate::core::cache::PriceCache;
use crate::core::chart::{ChartAggregator, ChartDataPoint, ZoomLevel};
use crate::core::sync::{DailyPriceSync, SyncReport};
use crate::core::transaction::{Transaction, TransactionFilter, TransactionSource, distinct_pairs};
use crate::core::zoom::ZoomNavigator;
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PairPage {
    /// Every asset bought with this fiat.
    Aggregate { fiat: String },
    SinglePair { asset: String, fiat: String },
}

impl PairPage {
    pub fn asset(&self) -> Option<&str> {
        match self {
            PairPage::Aggregate { .. } => None,
            PairPage::SinglePair { asset, .. } => Some(asset),
        }
    }

    pub fn fiat(&self) -> &str {
        match self {
            PairPage::Aggregate { fiat } | PairPage::SinglePair { fiat, .. } => fiat,
        }
    }

    fn includes(&self, tx: &Transaction) -> bool {
        tx.fiat == self.fiat() && self.asset().is_none_or(|a| a == tx.asset)
    }
}

impl fmt::Display for PairPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairPage::Aggregate { fiat } => write!(f, "All assets ({fiat})"),
            PairPage::SinglePair { asset, fiat } => write!(f, "{asset}/{fiat}"),
        }
    }
}

/// Aggregate pages for fiats shared by two or more assets, then one page per
/// pair in ledger order.
pub fn build_pages(transactions: &[Transaction]) -> Vec<PairPage> {
    let pairs = distinct_pairs(transactions);
    let mut fiats: Vec<&str> = Vec::new();
    for (_, fiat) in &pairs {
        if !fiats.contains(&fiat.as_str()) {
            fiats.push(fiat);
        }
    }

    let aggregates = fiats
        .into_iter()
        .filter(|fiat| pairs.iter().filter(|(_, f)| f.as_str() == *fiat).count() >= 2)
        .map(|fiat| PairPage::Aggregate {
            fiat: fiat.to_string(),
        });
    let singles = pairs
        .iter()
        .map(|(asset, fiat)| PairPage::SinglePair {
            asset: asset.clone(),
            fiat: fiat.clone(),
        });
    aggregates.chain(singles).collect()
}

/// One published chart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartUpdate {
    pub generation: u64,
    pub page: Option<PairPage>,
    pub zoom: ZoomLevel,
    pub points: Vec<ChartDataPoint>,
    pub transaction_count: usize,
    /// Set when the chart could not be computed; `points` is then empty.
    pub diagnostic: Option<String>,
}

/// Charts before and after a sync.
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    pub stale: Option<ChartUpdate>,
    pub sync: Option<SyncReport>,
    pub sync_error: Option<String>,
    pub fresh: Option<ChartUpdate>,
}

pub struct PortfolioSession {
    ledger: Arc<dyn TransactionSource>,
    aggregator: ChartAggregator,
    sync: Arc<DailyPriceSync>,
    transactions: Vec<Transaction>,
    exchange_filter: Option<String>,
    pages: Vec<PairPage>,
    selected: usize,
    navigator: ZoomNavigator,
    generation: AtomicU64,
    updates: watch::Sender<ChartUpdate>,
    sync_task: Option<JoinHandle<Result<SyncReport>>>,
    fixed_now: Option<DateTime<Utc>>,
}

impl PortfolioSession {
    pub fn new(
        ledger: Arc<dyn TransactionSource>,
        cache: Arc<dyn PriceCache>,
        sync: Arc<DailyPriceSync>,
    ) -> Self {
        let (updates, _) = watch::channel(ChartUpdate::default());
        Self {
            ledger,
            aggregator: ChartAggregator::new(cache),
            sync,
            transactions: Vec::new(),
            exchange_filter: None,
            pages: Vec::new(),
            selected: 0,
            navigator: ZoomNavigator::new(&[], Utc::now().date_naive()),
            generation: AtomicU64::new(0),
            updates,
            sync_task: None,
            fixed_now: None,
        }
    }

    /// Pins the clock, for reproducible charts.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Rereads the ledger and rebuilds the pages, keeping the selected page
    /// index when it still exists.
    pub async fn load(&mut self) -> Result<()> {
        self.transactions = self.ledger.completed(&TransactionFilter::default()).await?;
        debug!("Session loaded {} completed transactions", self.transactions.len());
        self.rebuild_pages();
        Ok(())
    }

    fn rebuild_pages(&mut self) {
        self.pages = build_pages(&self.visible_transactions());
        self.selected = self.selected.min(self.pages.len().saturating_sub(1));
        self.rebuild_navigator();
    }

    fn rebuild_navigator(&mut self) {
        let page_txs = self.page_transactions();
        let today = self.today();
        self.navigator.set_transactions(&page_txs, today);
    }

    pub fn subscribe(&self) -> watch::Receiver<ChartUpdate> {
        self.updates.subscribe()
    }

    pub fn pages(&self) -> &[PairPage] {
        &self.pages
    }

    pub fn selected_page(&self) -> Option<&PairPage> {
        self.pages.get(self.selected)
    }

    pub fn select_page(&mut self, index: usize) -> Result<()> {
        if index >= self.pages.len() {
            return Err(anyhow!("No page {index}, there are {}", self.pages.len()));
        }
        self.selected = index;
        self.rebuild_navigator();
        Ok(())
    }

    /// Selects the pair page, or the fiat's aggregate page when `asset` is
    /// `None`. A fiat with a single asset has no aggregate page, so its
    /// pair page is used.
    pub fn select_page_for(&mut self, asset: Option<&str>, fiat: &str) -> Result<()> {
        let index = match asset {
            Some(asset) => self
                .pages
                .iter()
                .position(|p| p.asset() == Some(asset) && p.fiat() == fiat),
            None => self
                .pages
                .iter()
                .position(|p| p.asset().is_none() && p.fiat() == fiat)
                .or_else(|| self.pages.iter().position(|p| p.fiat() == fiat)),
        };
        let index = index.with_context(|| match asset {
            Some(asset) => format!("No transactions for {asset}/{fiat}"),
            None => format!("No transactions in {fiat}"),
        })?;
        self.select_page(index)
    }

    /// Exchanges appearing in the ledger, sorted.
    pub fn available_exchanges(&self) -> Vec<String> {
        let mut exchanges: Vec<String> = self
            .transactions
            .iter()
            .filter_map(|tx| tx.exchange.clone())
            .collect();
        exchanges.sort();
        exchanges.dedup();
        exchanges
    }

    pub fn exchange_filter(&self) -> Option<&str> {
        self.exchange_filter.as_deref()
    }

    pub fn set_exchange_filter(&mut self, exchange: Option<String>) {
        self.exchange_filter = exchange;
        self.selected = 0;
        self.rebuild_pages();
    }

    fn visible_transactions(&self) -> Vec<Transaction> {
        let filter = TransactionFilter {
            exchange: self.exchange_filter.clone(),
            ..Default::default()
        };
        self.transactions
            .iter()
            .filter(|tx| filter.matches(tx))
            .cloned()
            .collect()
    }

    fn page_transactions(&self) -> Vec<Transaction> {
        let Some(page) = self.selected_page() else {
            return Vec::new();
        };
        self.visible_transactions()
            .into_iter()
            .filter(|tx| page.includes(tx))
            .collect()
    }

    pub fn navigator(&self) -> &ZoomNavigator {
        &self.navigator
    }

    pub fn zoom(&mut self) -> &mut ZoomNavigator {
        &mut self.navigator
    }

    /// Computes the chart for the current selection and publishes it, unless
    /// a newer request started meanwhile; then the result is dropped and
    /// `None` returned.
    pub async fn load_chart(&self) -> Option<ChartUpdate> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let page = self.selected_page().cloned();
        let zoom = self.navigator.level();
        let transactions = self.visible_transactions();

        let mut update = ChartUpdate {
            generation,
            page: page.clone(),
            zoom,
            ..Default::default()
        };
        if let Some(page) = &page {
            update.transaction_count = transactions.iter().filter(|tx| page.includes(tx)).count();
            match self
                .aggregator
                .calculate(
                    &transactions,
                    page.asset(),
                    Some(page.fiat()),
                    zoom,
                    self.today(),
                )
                .await
            {
                Ok(points) => update.points = points,
                Err(e) => {
                    warn!("Error computing chart for {page}: {e:#}");
                    update.diagnostic = Some(format!("{e:#}"));
                }
            }
        }

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Chart generation {generation} superseded, dropping result");
            return None;
        }
        self.updates.send_replace(update.clone());
        Some(update)
    }

    /// Starts a background sync, cancelling one still running.
    pub fn start_sync(&mut self) {
        if let Some(previous) = self.sync_task.take() {
            if !previous.is_finished() {
                debug!("Cancelling previous price sync");
                previous.abort();
            }
        }
        let sync = self.sync.clone();
        let now = self.now();
        self.sync_task = Some(tokio::spawn(async move {
            sync.sync_at(now.date_naive(), now).await
        }));
    }

    pub fn is_syncing(&self) -> bool {
        self.sync_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Waits for the background sync, if one was started.
    pub async fn finish_sync(&mut self) -> Result<Option<SyncReport>> {
        let Some(task) = self.sync_task.take() else {
            return Ok(None);
        };
        let report = task.await.context("Price sync task failed")??;
        Ok(Some(report))
    }

    /// Stale-then-fresh refresh: rereads the ledger, starts a sync, shows
    /// the chart from what is cached, then shows it again once the sync is
    /// done. A failed sync still yields the second chart.
    pub async fn refresh(&mut self) -> Result<RefreshOutcome> {
        self.load().await?;
        self.start_sync();

        let mut outcome = RefreshOutcome {
            stale: self.load_chart().await,
            ..Default::default()
        };
        match self.finish_sync().await {
            Ok(report) => outcome.sync = report,
            Err(e) => {
                warn!("Price sync failed: {e:#}");
                outcome.sync_error = Some(format!("{e:#}"));
            }
        }
        outcome.fresh = self.load_chart().await;
        info!(
            "Refresh done: {} points",
            outcome.fresh.as_ref().map_or(0, |u| u.points.len())
        );
        Ok(outcome)
    }
}
