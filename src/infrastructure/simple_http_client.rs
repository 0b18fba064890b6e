//! HTTP client for product page fetching
//!
//! One request per call: the caller owns the attempt loop, identity
//! rotation and backoff. Requests carry browser-like headers so the catalog
//! serves the regular desktop page.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::{debug, info};

use crate::infrastructure::config::CrawlerConfig;

/// Response of one page request. Error statuses keep their body: the
/// catalog serves its missing-product and robot-check pages with 404/503.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Lightweight page retrieval seam; tests substitute canned pages
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET `url` presenting `user_agent`. Only transport failures are errors.
    async fn fetch_page(&self, url: &str, user_agent: &str) -> Result<FetchedPage>;
}

/// Configuration for HTTP client behavior
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Whether to follow redirects
    pub follow_redirects: bool,
}

impl HttpClientConfig {
    pub fn from_crawler_config(crawler: &CrawlerConfig) -> Self {
        Self {
            timeout_seconds: crawler.request_timeout_seconds,
            ..Self::default()
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: crate::infrastructure::config::defaults::REQUEST_TIMEOUT_SECONDS,
            follow_redirects: true,
        }
    }
}

/// Headers sent with every page request besides the user agent
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers
}

/// HTTP client backed by a shared reqwest connection pool
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(browser_headers())
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch_page(&self, url: &str, user_agent: &str) -> Result<FetchedPage> {
        info!("🌐 HTTP GET: {}", url);
        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, user_agent)
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request failed: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body: {}", e))?;

        if status.is_success() && body.is_empty() {
            return Err(anyhow!("Empty response from {}", url));
        }

        debug!("Fetched {} bytes from {} (HTTP {})", body.len(), url, status.as_u16());
        Ok(FetchedPage {
            status: status.as_u16(),
            body,
        })
    }
}
