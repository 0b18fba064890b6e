//! Headless browser page retrieval
//!
//! Each call runs in its own browser process with its own identity and is
//! torn down before returning, whatever the outcome. When the rendered page
//! is a challenge and a [`ChallengeSolver`] is configured, one solve is
//! attempted before the page is handed back.

use anyhow::Result;
use async_trait::async_trait;
#[cfg(feature = "browser")]
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "browser")]
use crate::infrastructure::ocr::ChallengeSolver;
#[cfg(feature = "browser")]
use crate::infrastructure::parsing::BlockDetector;

/// Full browser retrieval seam; tests substitute canned pages
#[async_trait]
pub trait BrowserFetcher: Send + Sync {
    /// Render `url` in a fresh session presenting `user_agent` and return
    /// the final page HTML
    async fn fetch_rendered(&self, url: &str, user_agent: &str) -> Result<String>;
}

/// Browser session settings
#[derive(Debug, Clone)]
pub struct BrowserClientConfig {
    /// Upper bound for navigation and content reads
    pub page_timeout: Duration,
    /// CSS selector of the challenge image
    pub challenge_image: String,
    /// CSS selector of the challenge text input
    pub challenge_input: String,
    /// CSS selector of the challenge submit button
    pub challenge_submit: String,
}

impl Default for BrowserClientConfig {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(30),
            challenge_image: "form[action*='validateCaptcha'] img, div.a-row img[src*='captcha']".to_string(),
            challenge_input: "#captchacharacters".to_string(),
            challenge_submit: "button[type='submit'], input[type='submit']".to_string(),
        }
    }
}

/// Chromium defaults kept for every session. The launcher's own default set
/// is disabled because it carries `--enable-automation`, which exposes
/// `navigator.webdriver`.
const BASE_ARGS: &[&str] = &[
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-client-side-phishing-detection",
    "--disable-component-extensions-with-background-pages",
    "--disable-default-apps",
    "--disable-extensions",
    "--disable-hang-monitor",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--disable-renderer-backgrounding",
    "--disable-sync",
    "--metrics-recording-only",
    "--no-first-run",
    "--password-store=basic",
    "--use-mock-keychain",
    "--lang=en_US",
];

/// Command-line flags for one isolated session presenting `user_agent`
pub fn launch_args(user_agent: &str) -> Vec<String> {
    BASE_ARGS
        .iter()
        .copied()
        .chain([
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--disable-blink-features=AutomationControlled",
            "--disable-infobars",
            "--log-level=3",
        ])
        .map(str::to_string)
        .chain(std::iter::once(format!("--user-agent={}", user_agent)))
        .collect()
}

/// Stand-in used when browser support is compiled out
#[derive(Debug, Clone, Default)]
pub struct UnavailableBrowser;

#[async_trait]
impl BrowserFetcher for UnavailableBrowser {
    async fn fetch_rendered(&self, _url: &str, _user_agent: &str) -> Result<String> {
        Err(anyhow::anyhow!("browser support is not compiled in"))
    }
}

#[cfg(feature = "browser")]
pub use chrome::ChromeBrowser;

#[cfg(feature = "browser")]
mod chrome {
    use super::*;
    use anyhow::{Context, anyhow};
    use chromiumoxide::Page;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
    use futures::StreamExt;
    use tracing::{debug, info, warn};

    pub struct ChromeBrowser {
        config: BrowserClientConfig,
        detector: BlockDetector,
        solver: Option<Arc<dyn ChallengeSolver>>,
    }

    impl ChromeBrowser {
        pub fn new(
            config: BrowserClientConfig,
            detector: BlockDetector,
            solver: Option<Arc<dyn ChallengeSolver>>,
        ) -> Self {
            Self { config, detector, solver }
        }

        async fn launch(&self, user_agent: &str) -> Result<Browser> {
            let browser_cfg = launch_args(user_agent)
                .into_iter()
                .fold(BrowserConfig::builder().disable_default_args(), |builder, arg| {
                    builder.arg(arg)
                })
                .build()
                .map_err(|e| anyhow!("Browser config error: {}", e))?;

            let (browser, mut handler) = Browser::launch(browser_cfg)
                .await
                .map_err(|e| anyhow!("Browser launch failed: {}", e))?;

            tokio::spawn(async move { while handler.next().await.is_some() {} });
            Ok(browser)
        }

        async fn render(&self, browser: &Browser, url: &str) -> Result<String> {
            let timeout = self.config.page_timeout;
            let page = tokio::time::timeout(timeout, browser.new_page(url))
                .await
                .map_err(|_| anyhow!("Timed out opening {}", url))?
                .map_err(|e| anyhow!("Failed to open page: {}", e))?;

            let _ = tokio::time::timeout(timeout, page.wait_for_navigation()).await;
            let mut html = read_content(&page, timeout).await?;

            if self.detector.is_blocked(&html) {
                if let Some(solver) = &self.solver {
                    match self.solve_challenge(&page, solver.as_ref()).await {
                        Ok(()) => {
                            info!("Submitted challenge answer for {}", url);
                            html = read_content(&page, timeout).await?;
                        }
                        Err(e) => warn!("Challenge solving failed for {}: {}", url, e),
                    }
                }
            }

            if let Err(e) = page.close().await {
                debug!("Page close error: {}", e);
            }
            Ok(html)
        }

        async fn solve_challenge(&self, page: &Page, solver: &dyn ChallengeSolver) -> Result<()> {
            let image = page
                .find_element(self.config.challenge_image.as_str())
                .await
                .context("Challenge image not found")?
                .screenshot(CaptureScreenshotFormat::Png)
                .await
                .context("Failed to capture challenge image")?;

            let answer = solver.solve(&image).await?;

            page.find_element(self.config.challenge_input.as_str())
                .await
                .context("Challenge input not found")?
                .click()
                .await?
                .type_str(&answer)
                .await?;

            page.find_element(self.config.challenge_submit.as_str())
                .await
                .context("Challenge submit button not found")?
                .click()
                .await?;

            let _ = tokio::time::timeout(self.config.page_timeout, page.wait_for_navigation()).await;
            Ok(())
        }
    }

    async fn read_content(page: &Page, timeout: Duration) -> Result<String> {
        tokio::time::timeout(timeout, page.content())
            .await
            .map_err(|_| anyhow!("Timed out reading page content"))?
            .map_err(|e| anyhow!("Failed to get content: {}", e))
    }

    #[async_trait]
    impl BrowserFetcher for ChromeBrowser {
        async fn fetch_rendered(&self, url: &str, user_agent: &str) -> Result<String> {
            let mut browser = self.launch(user_agent).await?;

            let result = self.render(&browser, url).await;

            // Close on every path, including render failures
            if let Err(e) = browser.close().await {
                warn!("Browser close error: {}", e);
            }
            let _ = browser.wait().await;

            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_browser_reports_error() {
        let err = UnavailableBrowser
            .fetch_rendered("https://example/dp/AAA111", "agent")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not compiled"));
    }

    #[test]
    fn test_launch_args_hide_automation() {
        let args = launch_args("Mozilla/5.0 Test");

        assert!(!args.iter().any(|a| a == "--enable-automation"));
        assert!(args.iter().any(|a| a == "--disable-blink-features=AutomationControlled"));
        assert!(args.iter().any(|a| a == "--no-first-run"));
        assert_eq!(args.last().map(String::as_str), Some("--user-agent=Mozilla/5.0 Test"));
    }

    #[test]
    fn test_default_challenge_selectors() {
        let config = BrowserClientConfig::default();
        assert_eq!(config.challenge_input, "#captchacharacters");
        assert_eq!(config.page_timeout, Duration::from_secs(30));
    }
}
