use async_trait::async_trait;
use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

const DEFAULT_MAX_RETRIES: u32 = 0;
const MAX_REDIRECTS: usize = 3;
const USER_AGENT: &str = concat!("cyberpulse/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while retrieving a document over the network.
///
/// Covers the transport side only; a body that arrives intact but does not
/// parse is a [`ParseError`](super::ParseError).
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit for its kind
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Network collaborator used by the ingestion orchestrator.
///
/// Implementations return the raw body; format detection and parsing happen
/// in [`normalize`](super::normalize). A failed fetch is reported as is;
/// retrying is up to whoever owns the fetcher.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a feed document.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Fetch a thumbnail or artwork image. Defaults to [`Fetcher::fetch`].
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch(url).await
    }
}

/// `reqwest`-backed fetcher with size limits and a per-request timeout.
///
/// Makes a single attempt by default. [`HttpFetcher::with_max_retries`] opts
/// into exponential backoff on 429, 5xx and truncated bodies.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_feed_bytes: usize,
    max_image_bytes: usize,
    max_retries: u32,
    backoff_base: Duration,
}

impl HttpFetcher {
    pub fn new(
        client: reqwest::Client,
        timeout: Duration,
        max_feed_bytes: usize,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            client,
            timeout,
            max_feed_bytes,
            max_image_bytes,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: Duration::from_secs(1),
        }
    }

    /// Build a pooled client from the configured limits.
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect_policy())
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(config.fetch_timeout())
            .build()?;

        Ok(Self::new(
            client,
            config.fetch_timeout(),
            config.max_feed_bytes,
            config.max_image_bytes,
        ))
    }

    /// First retry waits `base`, then `2 * base`, `4 * base`.
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Retry up to `retries` times after the first attempt. Zero by default.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// The underlying client, shared with the download manager.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(retry))
    }

    async fn fetch_limited(&self, url: &str, limit: usize) -> Result<Vec<u8>, FetchError> {
        let mut retry_count = 0;

        loop {
            let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(FetchError::Network)?;

            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if retry_count >= self.max_retries {
                    return Err(FetchError::RateLimited(self.max_retries));
                }
                let delay = self.backoff(retry_count);
                tracing::warn!(
                    url = %url,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if status.is_server_error() {
                if retry_count >= self.max_retries {
                    return Err(FetchError::HttpStatus(status.as_u16()));
                }
                let delay = self.backoff(retry_count);
                tracing::warn!(
                    url = %url,
                    status = %status,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Server error, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            // 4xx fails immediately
            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            match read_limited_bytes(response, limit).await {
                Ok(bytes) => return Ok(bytes),
                Err(FetchError::IncompleteResponse { expected, received }) => {
                    if retry_count >= self.max_retries {
                        return Err(FetchError::IncompleteResponse { expected, received });
                    }
                    let delay = self.backoff(retry_count);
                    tracing::debug!(
                        url = %url,
                        expected = expected,
                        received = received,
                        attempt = retry_count + 1,
                        "Retrying incomplete download"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_limited(url, self.max_feed_bytes).await
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_limited(url, self.max_image_bytes).await
    }
}

/// At most three hops, no loops.
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: trust an oversized Content-Length
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{any, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>1</guid><title>Test</title></item>
</channel></rss>"#;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(reqwest::Client::new(), Duration::from_secs(5), 64 * 1024, 1024)
            .with_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let bytes = fetcher()
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, VALID_RSS.as_bytes());
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap_err();
        match err {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_error_retries_then_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4) // Initial request + 3 retries
            .mount(&mock_server)
            .await;

        let err = fetcher()
            .with_max_retries(3)
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap_err();
        match err {
            FetchError::HttpStatus(500) => {}
            e => panic!("Expected HttpStatus(500), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_503_retry_then_success() {
        let mock_server = MockServer::start().await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let bytes = fetcher()
            .with_max_retries(3)
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes.len(), VALID_RSS.len());
    }

    #[tokio::test]
    async fn test_fetch_429_gives_up_after_retries() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(429))
            .expect(4)
            .mount(&mock_server)
            .await;

        let err = fetcher()
            .with_max_retries(3)
            .fetch(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::RateLimited(3)));
    }

    #[tokio::test]
    async fn test_default_fetcher_does_not_retry() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = fetcher().fetch(&mock_server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(502)));
    }

    #[tokio::test]
    async fn test_default_fetcher_reports_rate_limit_immediately() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = fetcher().fetch(&mock_server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::RateLimited(0)));
    }

    #[tokio::test]
    async fn test_image_limit_is_separate_from_feed_limit() {
        let mock_server = MockServer::start().await;
        Mock::given(path("/big.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&mock_server)
            .await;

        let url = format!("{}/big.png", mock_server.uri());
        let fetcher = fetcher();

        // 4 KiB fits the feed limit but not the 1 KiB image limit
        assert_eq!(fetcher.fetch(&url).await.unwrap().len(), 4096);
        assert!(matches!(
            fetcher.fetch_image(&url).await.unwrap_err(),
            FetchError::ResponseTooLarge
        ));
    }

    #[test]
    fn test_backoff_doubles() {
        let fetcher = fetcher().with_backoff(Duration::from_millis(10));
        assert_eq!(fetcher.backoff(0), Duration::from_millis(10));
        assert_eq!(fetcher.backoff(1), Duration::from_millis(20));
        assert_eq!(fetcher.backoff(2), Duration::from_millis(40));
    }
}
