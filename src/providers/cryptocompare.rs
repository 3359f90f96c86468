use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::util::{RETRIES, RETRY_DELAY_MS, http_client, with_retry};
use crate::core::price::{HistoricalPriceProvider, PricePoint};

/// Deep daily history from the CryptoCompare `histoday` endpoint.
pub struct CryptoCompareProvider {
    base_url: String,
}

impl CryptoCompareProvider {
    pub fn new(base_url: &str) -> Self {
        CryptoCompareProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct HistodayResponse {
    #[serde(alias = "Response")]
    response: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
    #[serde(alias = "Data")]
    data: Option<HistodayData>,
}

#[derive(Deserialize, Debug)]
struct HistodayData {
    #[serde(alias = "Data")]
    data: Option<Vec<HistodayPoint>>,
}

#[derive(Deserialize, Debug)]
struct HistodayPoint {
    time: i64,
    close: Option<f64>,
}

/// Drops empty candles (the API pads pre-listing days with zeros) and
/// anything after `end_day`, then keeps the newest `max_days` points.
fn closes_ending_at(
    points: &[HistodayPoint],
    end_day: NaiveDate,
    max_days: u32,
) -> Vec<PricePoint> {
    let mut closes: Vec<PricePoint> = points
        .iter()
        .filter_map(|point| {
            let day = DateTime::from_timestamp(point.time, 0)?.date_naive();
            let price = Decimal::from_f64(point.close?).filter(|p| *p > Decimal::ZERO)?;
            (day <= end_day).then_some(PricePoint::new(day, price))
        })
        .collect();
    closes.sort_by_key(|p| p.day);
    closes.dedup_by_key(|p| p.day);
    let excess = closes.len().saturating_sub(max_days as usize);
    closes.drain(..excess);
    closes
}

#[async_trait]
impl HistoricalPriceProvider for CryptoCompareProvider {
    #[instrument(name = "CryptoCompareHistoday", skip(self), fields(asset = %asset, fiat = %fiat))]
    async fn daily_history_ending_at(
        &self,
        asset: &str,
        fiat: &str,
        end_day: NaiveDate,
        max_days: u32,
    ) -> Result<Vec<PricePoint>> {
        let fsym = asset.to_uppercase();
        let tsym = match fiat.to_uppercase().as_str() {
            "USDT" => "USD".to_string(),
            other => other.to_string(),
        };
        let to_ts = end_day
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .ok_or_else(|| anyhow!("Invalid end day: {end_day}"))?;
        let url = format!(
            "{}/data/v2/histoday?fsym={}&tsym={}&limit={}&toTs={}",
            self.base_url, fsym, tsym, max_days, to_ts
        );
        debug!("Requesting historical prices from {}", url);

        let client = http_client()?;
        let response = with_retry(
            || client.get(&url).header("Accept", "application/json").send(),
            RETRIES,
            RETRY_DELAY_MS,
        )
        .await
        .map_err(|e| anyhow!("Request error: {} for {}/{}", e, asset, fiat))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for {}/{}",
                response.status(),
                asset,
                fiat
            ));
        }

        let text = response.text().await?;
        let data: HistodayResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}/{}: {}", asset, fiat, e))?;

        if data.response.as_deref() != Some("Success") {
            return Err(anyhow!(
                "CryptoCompare error for {}/{}: {}",
                asset,
                fiat,
                data.message.unwrap_or_default()
            ));
        }

        let points = data.data.and_then(|d| d.data).unwrap_or_default();
        let closes = closes_ending_at(&points, end_day, max_days);
        debug!("Received {} daily prices", closes.len());
        Ok(closes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DAY: i64 = 86_400;
    // 2020-01-01T00:00:00Z
    const JAN_1: i64 = 1_577_836_800;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    #[test]
    fn test_closes_drop_padding_and_cap() {
        let points = vec![
            HistodayPoint { time: JAN_1, close: Some(0.0) },
            HistodayPoint { time: JAN_1 + DAY, close: Some(7100.0) },
            HistodayPoint { time: JAN_1 + 2 * DAY, close: Some(7200.0) },
            HistodayPoint { time: JAN_1 + 3 * DAY, close: None },
            HistodayPoint { time: JAN_1 + 4 * DAY, close: Some(7400.0) },
            HistodayPoint { time: JAN_1 + 5 * DAY, close: Some(7500.0) },
        ];
        let closes = closes_ending_at(&points, day(5), 2);
        assert_eq!(
            closes,
            vec![
                PricePoint::new(day(3), dec!(7200)),
                PricePoint::new(day(5), dec!(7400)),
            ]
        );
    }

    #[tokio::test]
    async fn test_successful_histoday_fetch() {
        let mock_server = MockServer::start().await;
        let body = format!(
            r#"{{
                "Response": "Success",
                "Message": "",
                "Data": {{
                    "Aggregated": false,
                    "Data": [
                        {{"time": {}, "close": 7200.5}},
                        {{"time": {}, "close": 7300.0}}
                    ]
                }}
            }}"#,
            JAN_1,
            JAN_1 + DAY
        );
        Mock::given(method("GET"))
            .and(path("/data/v2/histoday"))
            .and(query_param("fsym", "BTC"))
            .and(query_param("tsym", "USD"))
            .and(query_param("limit", "2000"))
            .and(query_param("toTs", (JAN_1 + DAY).to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let provider = CryptoCompareProvider::new(&mock_server.uri());
        let closes = provider
            .daily_history_ending_at("btc", "USDT", day(2), 2000)
            .await
            .unwrap();
        assert_eq!(closes.len(), 2);
        assert_eq!(closes[0], PricePoint::new(day(1), dec!(7200.5)));
    }

    #[tokio::test]
    async fn test_error_response_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/v2/histoday"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"Response": "Error", "Message": "rate limit", "Data": {}}"#,
            ))
            .mount(&mock_server)
            .await;

        let provider = CryptoCompareProvider::new(&mock_server.uri());
        let result = provider
            .daily_history_ending_at("BTC", "EUR", day(2), 10)
            .await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "CryptoCompare error for BTC/EUR: rate limit"
        );
    }

    #[tokio::test]
    async fn test_all_padding_means_no_older_data() {
        let mock_server = MockServer::start().await;
        let body = format!(
            r#"{{"Response": "Success", "Data": {{"Data": [{{"time": {}, "close": 0}}]}}}}"#,
            JAN_1
        );
        Mock::given(method("GET"))
            .and(path("/data/v2/histoday"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let provider = CryptoCompareProvider::new(&mock_server.uri());
        let closes = provider
            .daily_history_ending_at("BTC", "EUR", day(1), 10)
            .await
            .unwrap();
        assert!(closes.is_empty());
    }
}
