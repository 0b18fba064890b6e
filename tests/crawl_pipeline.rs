//! End-to-end crawl: scripted pages through the real parser, fetch strategy,
//! orchestrator and SQLite repository

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

use rank_crawler_lib::application::{CrawlOrchestrator, FetchStrategy, ProgressSink};
use rank_crawler_lib::domain::ProgressEvent;
use rank_crawler_lib::infrastructure::{
    CrawlerConfig, DatabaseConnection, FetchedPage, LocatorTable, PageFetcher, ProductPageParser,
    ProductRepository, UnavailableBrowser, UserAgentPool,
};

const CAPTCHA: &str = "<html><body><p>Type the characters you see in this image.</p></body></html>";

fn product_page(asin: &str, rank: &str, price: &str) -> String {
    format!(
        r#"<html><body>
            <span id="productTitle">Widget {asin}</span>
            <a id="bylineInfo">Acme</a>
            <span class="a-price"><span class="a-offscreen">${price}</span></span>
            <div id="imgTagWrapperId"><img src="https://img.example/{asin}.jpg"></div>
            <div id="detailBulletsWrapper_feature_div"><ul>
                <li><span>ASIN : {asin}</span></li>
                <li><span>Best Sellers Rank: #{rank} in Tools</span></li>
            </ul></div>
        </body></html>"#
    )
}

/// Serves a fixed page per URL
#[derive(Default)]
struct StaticSite {
    pages: Mutex<HashMap<String, String>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl StaticSite {
    fn serve(&self, url: &str, body: String) {
        self.pages.lock().unwrap().insert(url.to_string(), body);
    }

    fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PageFetcher for StaticSite {
    async fn fetch_page(&self, url: &str, _user_agent: &str) -> Result<FetchedPage> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .map(FetchedPage::ok)
            .ok_or_else(|| anyhow::anyhow!("connection refused"))
    }
}

#[derive(Default)]
struct Collected(Mutex<Vec<ProgressEvent>>);

impl ProgressSink for Collected {
    fn emit(&self, event: &ProgressEvent) -> Result<()> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

fn crawler_config() -> CrawlerConfig {
    CrawlerConfig {
        requests_attempts: 2,
        selenium_attempts: 0,
        crawl_delay_ms: 0,
        max_url_retries: 1,
        backoff_min_ms: 0,
        backoff_max_ms: 0,
        ..CrawlerConfig::default()
    }
}

async fn open_repository(dir: &std::path::Path) -> Arc<ProductRepository> {
    let db_path = dir.join("crawl.db");
    let db = DatabaseConnection::new(&format!("sqlite:{}", db_path.display()))
        .await
        .unwrap();
    db.ensure_schema().await.unwrap();
    Arc::new(ProductRepository::new(Arc::new(db.pool().clone())))
}

fn orchestrator(
    site: Arc<StaticSite>,
    repository: Arc<ProductRepository>,
    sink: Arc<Collected>,
) -> CrawlOrchestrator {
    let config = crawler_config();
    let parser = Arc::new(ProductPageParser::new(&LocatorTable::default()).unwrap());
    let strategy = FetchStrategy::new(
        &config,
        parser,
        site,
        Arc::new(UnavailableBrowser),
        Arc::new(UserAgentPool::fallback()),
    );
    CrawlOrchestrator::new(Arc::new(strategy), repository, sink, &config)
}

#[tokio::test]
async fn test_rank_change_is_tracked_across_runs() {
    let dir = tempdir().unwrap();
    let repository = open_repository(dir.path()).await;
    let site = Arc::new(StaticSite::default());
    let url = "https://www.amazon.com/dp/B0PIPE0001".to_string();

    site.serve(&url, product_page("B0PIPE0001", "1,234", "19.99"));
    let sink = Arc::new(Collected::default());
    let summary = orchestrator(site.clone(), repository.clone(), sink.clone())
        .run(std::slice::from_ref(&url))
        .await;

    assert!(summary.is_success());
    assert_eq!(
        *sink.0.lock().unwrap(),
        vec![ProgressEvent::updated(1, 1, "B0PIPE0001", &url)]
    );

    let product = repository.get_product("B0PIPE0001").await.unwrap().unwrap();
    assert_eq!(product.name, "Widget B0PIPE0001");
    assert_eq!(product.rank, Some(1234));
    assert_eq!(product.price, Some(19.99));
    assert_eq!(repository.rank_history("B0PIPE0001").await.unwrap().len(), 1);

    // Same rank again: row refreshed, trail untouched
    orchestrator(site.clone(), repository.clone(), Arc::new(Collected::default()))
        .run(std::slice::from_ref(&url))
        .await;
    assert_eq!(repository.rank_history("B0PIPE0001").await.unwrap().len(), 1);

    // New rank: appended and newest first
    site.serve(&url, product_page("B0PIPE0001", "987", "17.49"));
    orchestrator(site.clone(), repository.clone(), Arc::new(Collected::default()))
        .run(std::slice::from_ref(&url))
        .await;

    let history = repository.rank_history("B0PIPE0001").await.unwrap();
    assert_eq!(history.iter().map(|h| h.rank).collect::<Vec<_>>(), vec![987, 1234]);
    assert_eq!(history[0].price, Some(17.49));
    assert_eq!(
        repository.get_product("B0PIPE0001").await.unwrap().unwrap().rank,
        Some(987)
    );
}

#[tokio::test]
async fn test_blocked_url_never_reaches_the_store() {
    let dir = tempdir().unwrap();
    let repository = open_repository(dir.path()).await;
    let site = Arc::new(StaticSite::default());

    let good = "https://www.amazon.com/dp/B0GOOD0001".to_string();
    let blocked = "https://www.amazon.com/dp/B0BLOCK001".to_string();
    site.serve(&good, product_page("B0GOOD0001", "50", "5.00"));
    site.serve(&blocked, CAPTCHA.to_string());

    let sink = Arc::new(Collected::default());
    let summary = orchestrator(site.clone(), repository.clone(), sink.clone())
        .run(&[blocked.clone(), good.clone(), blocked.clone()])
        .await;

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.dropped, 1);
    assert!(summary.is_success());

    // Two attempts per pass, one requeue
    assert_eq!(site.hits(&blocked), 4);
    assert!(repository.get_product("B0BLOCK001").await.unwrap().is_none());

    let events = sink.0.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].asin, "B0GOOD0001");
    assert_eq!(events[0].index, 2);
}
