//! Crawl orchestration
//!
//! Drives one batch of product URLs through fetch and persistence on a
//! single worker. Failed URLs go back to the tail of the queue, so every
//! URL gets its first attempt before any URL gets a second one.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use std::collections::{HashSet, VecDeque};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::application::fetch_strategy::ProductSource;
use crate::domain::errors::{CrawlError, InputError};
use crate::domain::events::{CrawlItemState, CrawlSummary, ProgressEvent};
use crate::domain::product::ProductRecord;
use crate::domain::repositories::ProductStore;
use crate::infrastructure::config::CrawlerConfig;

/// Receives one event per persisted product
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent) -> Result<()>;
}

/// Writes each event as one JSON line on stdout and flushes immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn emit(&self, event: &ProgressEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", line).context("Failed to write progress event")?;
        handle.flush().context("Failed to flush progress event")?;
        Ok(())
    }
}

/// Parse the stdin batch: a non-empty JSON array of URL strings
pub fn parse_url_batch(input: &str) -> Result<Vec<String>, InputError> {
    let value: serde_json::Value = serde_json::from_str(input)?;
    let items = value.as_array().ok_or(InputError::NotAnArray)?;
    if items.is_empty() {
        return Err(InputError::Empty);
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_str()
                .map(str::to_string)
                .ok_or(InputError::NonStringElement { index })
        })
        .collect()
}

/// Drop repeated URLs, keeping the first occurrence of each
pub fn dedup_preserving_order(urls: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueItem {
    url: String,
    attempts: u32,
}

pub struct CrawlOrchestrator {
    source: Arc<dyn ProductSource>,
    store: Arc<dyn ProductStore>,
    progress: Arc<dyn ProgressSink>,
    max_url_retries: u32,
    crawl_delay: Duration,
}

impl CrawlOrchestrator {
    pub fn new(
        source: Arc<dyn ProductSource>,
        store: Arc<dyn ProductStore>,
        progress: Arc<dyn ProgressSink>,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            source,
            store,
            progress,
            max_url_retries: config.max_url_retries,
            crawl_delay: config.crawl_delay(),
        }
    }

    /// Process every URL until the queue drains
    pub async fn run(&self, urls: &[String]) -> CrawlSummary {
        let unique = dedup_preserving_order(urls);
        let total = unique.len();
        let mut queue: VecDeque<QueueItem> = unique
            .into_iter()
            .map(|url| {
                debug!(url = %url, state = %CrawlItemState::Pending);
                QueueItem { url, attempts: 0 }
            })
            .collect();

        let mut summary = CrawlSummary {
            total,
            ..CrawlSummary::default()
        };

        info!("Starting to crawl {} product URLs", total);

        // Counts every dequeue, retries included
        let mut index = 0;
        while let Some(item) = queue.pop_front() {
            index += 1;
            info!("Progress: {}/{}", index, total);

            match self.process(&item.url).await {
                Ok(record) => {
                    summary.succeeded += 1;
                    debug!(url = %item.url, state = %CrawlItemState::Success);
                    info!("Product {}/{} saved: {}", index, total, record.short_title());

                    let event = ProgressEvent::updated(index, total, &record.asin, &record.url);
                    if let Err(e) = self.progress.emit(&event) {
                        warn!("Failed to emit progress event: {}", e);
                    }
                }
                Err(err) => {
                    let state = if err.is_not_found() {
                        CrawlItemState::NotFound
                    } else {
                        CrawlItemState::Error
                    };
                    warn!(
                        "Product {}/{} {} ({}): {}",
                        index,
                        total,
                        state,
                        err.sentinel_title(),
                        err
                    );

                    if item.attempts < self.max_url_retries {
                        info!(
                            "Requeue URL (attempt {}/{}): {}",
                            item.attempts + 1,
                            self.max_url_retries,
                            item.url
                        );
                        debug!(url = %item.url, state = %CrawlItemState::Pending);
                        queue.push_back(QueueItem {
                            url: item.url,
                            attempts: item.attempts + 1,
                        });
                    } else {
                        warn!("Dropping URL after {} retries: {}", item.attempts, item.url);
                        summary.dropped += 1;
                    }
                }
            }

            summary.processed += 1;

            if !self.crawl_delay.is_zero() {
                tokio::time::sleep(self.crawl_delay).await;
            }
        }

        info!("Crawling completed. {}", summary);
        summary
    }

    /// Fetch, validate and persist one URL
    async fn process(&self, url: &str) -> Result<ProductRecord, CrawlError> {
        debug!(url, state = %CrawlItemState::Fetching);
        let record = self.source.fetch_product(url).await?;

        debug!(url, state = %CrawlItemState::Extracting);
        if !record.has_identifier() {
            return Err(CrawlError::InvalidRecord(format!("no product identifier for {}", url)));
        }

        self.store.save_observation(&record).await.map_err(|e| {
            e.downcast_ref::<CrawlError>()
                .cloned()
                .unwrap_or_else(|| CrawlError::Persistence(format!("{:#}", e)))
        })?;

        Ok(record)
    }
}
