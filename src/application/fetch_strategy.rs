//! Page acquisition with identity rotation and engine fallback
//!
//! The lightweight path issues plain HTTP requests; the browser path renders
//! the page in a fresh headless session. Both classify what they receive,
//! retry challenge pages and imageless pages with a new identity, and return
//! a parsed [`ProductRecord`] or the per-URL [`CrawlError`].

#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::errors::CrawlError;
use crate::domain::product::ProductRecord;
use crate::infrastructure::browser_client::BrowserFetcher;
use crate::infrastructure::config::{CrawlerConfig, FetchEngine};
use crate::infrastructure::parsing::{LocatorTable, PageClass, ProductPageParser};
use crate::infrastructure::simple_http_client::{
    FetchedPage, HttpClient, HttpClientConfig, PageFetcher,
};
use crate::infrastructure::user_agents::{UserAgentPool, UserAgentProvider};

/// Turns a product URL into a product record
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn fetch_product(&self, url: &str) -> Result<ProductRecord, CrawlError>;
}

/// Randomized pause between fetch attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Backoff {
    pub fn none() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }

    pub fn next_delay(&self) -> Duration {
        let max = self.max_ms.max(self.min_ms);
        Duration::from_millis(fastrand::u64(self.min_ms..=max))
    }

    async fn wait(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// What one fetched page turned out to be
enum Attempt {
    Done(ProductRecord),
    NotFound,
    Retry(&'static str),
}

pub struct FetchStrategy {
    engine: FetchEngine,
    allow_browser_fallback: bool,
    requests_attempts: u32,
    browser_attempts: u32,
    backoff: Backoff,
    parser: Arc<ProductPageParser>,
    http: Arc<dyn PageFetcher>,
    browser: Arc<dyn BrowserFetcher>,
    user_agents: Arc<dyn UserAgentProvider>,
}

impl FetchStrategy {
    pub fn new(
        config: &CrawlerConfig,
        parser: Arc<ProductPageParser>,
        http: Arc<dyn PageFetcher>,
        browser: Arc<dyn BrowserFetcher>,
        user_agents: Arc<dyn UserAgentProvider>,
    ) -> Self {
        Self {
            engine: config.engine,
            allow_browser_fallback: config.allow_selenium_fallback,
            requests_attempts: config.requests_attempts.max(1),
            browser_attempts: config.selenium_attempts,
            backoff: Backoff {
                min_ms: config.backoff_min_ms,
                max_ms: config.backoff_max_ms,
            },
            parser,
            http,
            browser,
            user_agents,
        }
    }

    /// Wire the production fetchers from configuration
    pub async fn from_config(config: &CrawlerConfig) -> Result<Self> {
        let locators = LocatorTable::load_or_default(config.locators_path.as_deref())?;
        let parser = Arc::new(ProductPageParser::new(&locators)?);
        let http = HttpClient::with_config(HttpClientConfig::from_crawler_config(config))?;
        let user_agents =
            UserAgentPool::load(config.user_agents_url.as_deref(), config.request_timeout()).await;
        let browser = build_browser(config, &parser);

        info!(
            "Fetch engine: {} (requests attempts: {}, browser attempts: {}, browser fallback: {})",
            config.engine, config.requests_attempts, config.selenium_attempts, config.allow_selenium_fallback
        );

        Ok(Self::new(config, parser, Arc::new(http), browser, Arc::new(user_agents)))
    }

    /// Classify an HTTP response by its body first; an error status only
    /// matters for a page that is neither missing nor a challenge
    fn evaluate_response(&self, page: &FetchedPage, url: &str) -> Attempt {
        match self.parser.detector().classify(&page.body) {
            PageClass::NotFound => Attempt::NotFound,
            PageClass::Blocked => Attempt::Retry("captcha detected"),
            PageClass::Normal if !page.is_success() => {
                debug!("HTTP {} for {}", page.status, url);
                Attempt::Retry("HTTP error status")
            }
            PageClass::Normal => self.evaluate(&page.body, url),
        }
    }

    /// Classify and parse one page body
    fn evaluate(&self, body: &str, url: &str) -> Attempt {
        match self.parser.detector().classify(body) {
            PageClass::NotFound => return Attempt::NotFound,
            PageClass::Blocked => return Attempt::Retry("captcha detected"),
            PageClass::Normal => {}
        }

        match self.parser.parse(body, url) {
            Ok(page) if page.has_image() => Attempt::Done(page.into_record()),
            Ok(_) => Attempt::Retry("image not found"),
            Err(CrawlError::NotFound { .. }) => Attempt::NotFound,
            Err(e) => {
                warn!("Extraction failed for {}: {}", url, e);
                Attempt::Retry("extraction failed")
            }
        }
    }

    /// Plain HTTP with identity rotation
    pub async fn fetch_lightweight(&self, url: &str) -> Result<ProductRecord, CrawlError> {
        let attempts = self.requests_attempts;

        for attempt in 1..=attempts {
            let user_agent = self.user_agents.next_user_agent();
            debug!("[requests {}/{}] UA: {:.40}", attempt, attempts, user_agent);

            match self.http.fetch_page(url, &user_agent).await {
                Ok(page) => match self.evaluate_response(&page, url) {
                    Attempt::Done(record) => return Ok(record),
                    Attempt::NotFound => {
                        info!("Product not found: {}", url);
                        return Err(CrawlError::NotFound { url: url.to_string() });
                    }
                    Attempt::Retry(reason) => {
                        warn!("Requests attempt {}/{}: {}, rotating user-agent", attempt, attempts, reason);
                    }
                },
                Err(e) => warn!("Requests attempt {}/{} failed: {}", attempt, attempts, e),
            }

            if attempt < attempts {
                self.backoff.wait().await;
            }
        }

        Err(CrawlError::Blocked { engine: "requests", attempts })
    }

    /// Headless browser, one fresh session per attempt
    pub async fn fetch_with_browser(&self, url: &str) -> Result<ProductRecord, CrawlError> {
        let attempts = self.browser_attempts;
        if attempts == 0 {
            debug!("Browser attempts disabled for {}", url);
            return Err(CrawlError::Exhausted);
        }

        let mut rendered_any = false;
        let mut last_setup_error = None;

        for attempt in 1..=attempts {
            let user_agent = self.user_agents.next_user_agent();
            info!("[browser {}/{}] UA: {:.40}", attempt, attempts, user_agent);

            match self.browser.fetch_rendered(url, &user_agent).await {
                Ok(html) => {
                    rendered_any = true;
                    match self.evaluate(&html, url) {
                        Attempt::Done(record) => return Ok(record),
                        Attempt::NotFound => {
                            info!("Product not found: {}", url);
                            return Err(CrawlError::NotFound { url: url.to_string() });
                        }
                        Attempt::Retry(reason) => {
                            warn!("Browser attempt {}/{}: {}", attempt, attempts, reason);
                        }
                    }
                }
                Err(e) => {
                    warn!("Browser attempt {}/{} failed: {}", attempt, attempts, e);
                    last_setup_error = Some(e.to_string());
                }
            }

            if attempt < attempts {
                self.backoff.wait().await;
            }
        }

        match last_setup_error {
            Some(message) if !rendered_any => Err(CrawlError::BrowserUnavailable(message)),
            _ => Err(CrawlError::Exhausted),
        }
    }
}

#[async_trait]
impl ProductSource for FetchStrategy {
    async fn fetch_product(&self, url: &str) -> Result<ProductRecord, CrawlError> {
        match self.engine {
            FetchEngine::Requests => self.fetch_lightweight(url).await,
            FetchEngine::Selenium => self.fetch_with_browser(url).await,
            FetchEngine::Auto => match self.fetch_lightweight(url).await {
                Err(e) if e.is_blocked() && self.allow_browser_fallback => {
                    info!("Falling back to browser for {}", url);
                    self.fetch_with_browser(url).await
                }
                result => result,
            },
        }
    }
}

#[cfg(feature = "browser")]
fn build_browser(config: &CrawlerConfig, parser: &ProductPageParser) -> Arc<dyn BrowserFetcher> {
    use crate::infrastructure::browser_client::{BrowserClientConfig, ChromeBrowser};
    use crate::infrastructure::ocr::{ChallengeSolver, TesseractSolver};

    let solver: Option<Arc<dyn ChallengeSolver>> = if config.ocr_enabled {
        Some(Arc::new(TesseractSolver::new(config.tesseract_path.clone())))
    } else {
        None
    };

    Arc::new(ChromeBrowser::new(
        BrowserClientConfig::default(),
        parser.detector().clone(),
        solver,
    ))
}

#[cfg(not(feature = "browser"))]
fn build_browser(_config: &CrawlerConfig, _parser: &ProductPageParser) -> Arc<dyn BrowserFetcher> {
    Arc::new(crate::infrastructure::browser_client::UnavailableBrowser)
}
