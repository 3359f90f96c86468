//! Upstream daily price sources.

pub mod coingecko;
pub mod cryptocompare;
pub mod util;

pub use coingecko::CoinGeckoProvider;
pub use cryptocompare::CryptoCompareProvider;
