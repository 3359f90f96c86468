use chrono::{Duration, NaiveDate, Utc};
use dcatrack::core::config::SyncConfig;
use dcatrack::core::sync::{BackfillOutcome, DailyPriceSync, ForwardOutcome};
use dcatrack::core::transaction::{MemoryLedger, Transaction, TransactionStatus};
use dcatrack::providers::{CoinGeckoProvider, CryptoCompareProvider};
use dcatrack::store::memory::MemoryPriceCache;
use rust_decimal_macros::dec;
use std::fs;
use std::sync::Arc;
use tracing::info;

mod test_utils {
    use chrono::NaiveDate;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn midnight(day: NaiveDate) -> i64 {
        day.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp()
    }

    /// `market_chart` body with one sample per day in `first..=last`.
    pub fn market_chart_body(first: NaiveDate, last: NaiveDate, price: f64) -> String {
        let samples: Vec<String> = first
            .iter_days()
            .take_while(|d| *d <= last)
            .map(|d| format!("[{}, {price}]", midnight(d) * 1000))
            .collect();
        format!(r#"{{"prices": [{}]}}"#, samples.join(","))
    }

    /// `histoday` body with one candle per day in `first..=last`.
    pub fn histoday_body(first: NaiveDate, last: NaiveDate, price: f64) -> String {
        let candles: Vec<String> = first
            .iter_days()
            .take_while(|d| *d <= last)
            .map(|d| format!(r#"{{"time": {}, "close": {price}}}"#, midnight(d)))
            .collect();
        format!(
            r#"{{"Response": "Success", "Message": "", "Data": {{"Data": [{}]}}}}"#,
            candles.join(",")
        )
    }

    pub async fn create_mock_server(
        coingecko_body: String,
        cryptocompare_body: Option<String>,
    ) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/coins/bitcoin/market_chart"))
            .respond_with(ResponseTemplate::new(200).set_body_string(coingecko_body))
            .mount(&mock_server)
            .await;

        let histoday = Mock::given(method("GET")).and(path("/data/v2/histoday"));
        match cryptocompare_body {
            Some(body) => {
                histoday
                    .respond_with(ResponseTemplate::new(200).set_body_string(body))
                    .expect(1)
                    .mount(&mock_server)
                    .await
            }
            None => {
                histoday
                    .respond_with(ResponseTemplate::new(500))
                    .expect(0)
                    .mount(&mock_server)
                    .await
            }
        }

        mock_server
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn buy_days_ago(days: i64, fiat_amount: &str, crypto_amount: &str) -> Transaction {
    Transaction {
        id: None,
        exchange: Some("coinmate".to_string()),
        asset: "BTC".to_string(),
        fiat: "EUR".to_string(),
        fiat_amount: fiat_amount.parse().unwrap(),
        crypto_amount: crypto_amount.parse().unwrap(),
        price: dec!(40000),
        status: TransactionStatus::Completed,
        executed_at: Utc::now() - Duration::days(days),
    }
}

fn fast_sync() -> SyncConfig {
    SyncConfig {
        rate_limit_delay_ms: 0,
        ..SyncConfig::default()
    }
}

#[test_log::test(tokio::test)]
async fn test_sync_bootstraps_recent_prices() {
    let today = today();
    let body = test_utils::market_chart_body(today - Duration::days(40), today, 41000.0);
    let mock_server = test_utils::create_mock_server(body, None).await;

    let cache = Arc::new(MemoryPriceCache::new());
    let sync = DailyPriceSync::new(
        Arc::new(MemoryLedger::new(vec![buy_days_ago(10, "100", "0.0025")])),
        cache.clone(),
        Arc::new(CoinGeckoProvider::new(&mock_server.uri())),
        Arc::new(CryptoCompareProvider::new(&mock_server.uri())),
        fast_sync(),
    );

    let report = sync.sync().await.unwrap();
    info!(?report, "Sync finished");

    assert!(report.failures.is_empty());
    let pair = &report.pairs[0];
    assert_eq!(pair.desired_start, today - Duration::days(30));
    assert_eq!(pair.forward, ForwardOutcome::Bootstrapped { stored: 41 });
    assert_eq!(pair.backfill, BackfillOutcome::Covered);
    assert_eq!(cache.len().await, 41);
    assert!(cache.get("BTC", "EUR", today).await.is_some_and(|p| p.is_provisional()));
}

#[test_log::test(tokio::test)]
async fn test_sync_backfills_to_first_transaction() {
    let today = today();
    let recent = test_utils::market_chart_body(today - Duration::days(19), today, 42000.0);
    let deep = test_utils::histoday_body(
        today - Duration::days(100),
        today - Duration::days(20),
        30000.0,
    );
    let mock_server = test_utils::create_mock_server(recent, Some(deep)).await;

    let cache = Arc::new(MemoryPriceCache::new());
    let sync = DailyPriceSync::new(
        Arc::new(MemoryLedger::new(vec![buy_days_ago(100, "100", "0.0025")])),
        cache.clone(),
        Arc::new(CoinGeckoProvider::new(&mock_server.uri())),
        Arc::new(CryptoCompareProvider::new(&mock_server.uri())),
        fast_sync(),
    );

    let report = sync.sync().await.unwrap();
    let pair = &report.pairs[0];
    assert_eq!(pair.backfill, BackfillOutcome::Completed);
    assert_eq!(pair.backfill_calls, 1);
    assert_eq!(pair.backfill_stored, 81);
    assert_eq!(cache.len().await, 101);
    assert_eq!(
        cache
            .get("BTC", "EUR", today - Duration::days(100))
            .await
            .map(|p| p.price),
        Some(dec!(30000))
    );
}

/// Writes a config and ledger into `dir`, pointing providers at `base_url`.
fn write_app_files(dir: &std::path::Path, base_url: &str) -> std::path::PathBuf {
    let executed_at = (Utc::now() - Duration::days(10)).to_rfc3339();
    let ledger = format!(
        r#"
transactions:
  - id: 1
    exchange: coinmate
    asset: BTC
    fiat: EUR
    fiat_amount: "100"
    crypto_amount: "0.0025"
    price: "40000"
    status: completed
    executed_at: "{executed_at}"
  - id: 2
    exchange: coinmate
    asset: BTC
    fiat: EUR
    fiat_amount: "100"
    crypto_amount: "1"
    price: "100"
    status: failed
    executed_at: "{executed_at}"
"#
    );
    let ledger_path = dir.join("ledger.yaml");
    fs::write(&ledger_path, ledger).expect("Failed to write ledger file");

    let config = format!(
        r#"
fiat: "EUR"
ledger_path: "{}"
data_path: "{}"
providers:
  coingecko:
    base_url: {base_url}
  cryptocompare:
    base_url: {base_url}
sync:
  rate_limit_delay_ms: 0
"#,
        ledger_path.display(),
        dir.join("data").display(),
    );
    let config_path = dir.join("config.yaml");
    fs::write(&config_path, config).expect("Failed to write config file");
    config_path
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_sync_command() {
    let today = today();
    let body = test_utils::market_chart_body(today - Duration::days(40), today, 41000.0);
    let mock_server = test_utils::create_mock_server(body, None).await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_path = write_app_files(dir.path(), &mock_server.uri());

    let result = dcatrack::run_command(dcatrack::AppCommand::Sync, config_path.to_str()).await;
    assert!(result.is_ok(), "Sync failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_chart_command() {
    let today = today();
    let body = test_utils::market_chart_body(today - Duration::days(40), today, 41000.0);
    let mock_server = test_utils::create_mock_server(body, None).await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_path = write_app_files(dir.path(), &mock_server.uri());

    let options = dcatrack::cli::chart::ChartOptions {
        asset: Some("BTC".to_string()),
        exchange: Some("coinmate".to_string()),
        ..Default::default()
    };
    let result =
        dcatrack::run_command(dcatrack::AppCommand::Chart(options), config_path.to_str()).await;
    assert!(result.is_ok(), "Chart failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_offline_chart_never_calls_providers() {
    let mock_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .respond_with(wiremock::ResponseTemplate::new(500))
        .expect(0)
        .mount(&mock_server)
        .await;
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_path = write_app_files(dir.path(), &mock_server.uri());

    let options = dcatrack::cli::chart::ChartOptions {
        offline: true,
        ..Default::default()
    };
    let result =
        dcatrack::run_command(dcatrack::AppCommand::Chart(options), config_path.to_str()).await;
    assert!(result.is_ok(), "Chart failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_summary_command() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_path = write_app_files(dir.path(), "http://127.0.0.1:9");

    let result = dcatrack::run_command(dcatrack::AppCommand::Summary, config_path.to_str()).await;
    assert!(result.is_ok(), "Summary failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_missing_config_is_an_error() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let missing = dir.path().join("nope.yaml");

    let err = dcatrack::run_command(dcatrack::AppCommand::Summary, missing.to_str())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
