use anyhow::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Per-request timeout for every provider call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const RETRIES: usize = 2;
pub const RETRY_DELAY_MS: u64 = 500;

pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent("dcatrack/1.0")
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Retries an async operation with configurable attempts and delays
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// # Returns
/// Either the successful result or the error after all attempts
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await.map_err(anyhow::Error::from) {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_with_retry_gives_up_after_retries() {
        let mut calls = 0;
        let result: Result<()> = with_retry(
            || {
                calls += 1;
                // Nothing listens on port 9 of the loopback interface.
                reqwest::Client::new().get("http://127.0.0.1:9/").send()
            },
            2,
            1,
        )
        .await
        .map(|_| ());
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_with_retry_returns_first_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = http_client().unwrap();
        let url = server.uri();
        let response = with_retry(|| client.get(&url).send(), RETRIES, 1)
            .await
            .unwrap();
        assert!(response.status().is_success());
    }
}
