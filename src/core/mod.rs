//! Portfolio performance engine

pub mod cache;
pub mod chart;
pub mod config;
pub mod holdings;
pub mod log;
pub mod price;
pub mod session;
pub mod sync;
pub mod transaction;
pub mod zoom;

// Re-export main types for cleaner imports
pub use cache::PriceCache;
pub use chart::{ChartAggregator, ChartDataPoint, ZoomLevel};
pub use price::{HistoricalPriceProvider, PricePoint, RecentPriceProvider};
pub use session::{ChartUpdate, PairPage, PortfolioSession};
pub use sync::{DailyPriceSync, SyncReport};
pub use transaction::{Transaction, TransactionFilter, TransactionSource};
pub use zoom::ZoomNavigator;
