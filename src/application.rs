//! Application layer module
//!
//! This module contains the fetch strategy and the crawl orchestrator
//! that drive the domain types through the infrastructure adapters.

pub mod crawl_orchestrator;
pub mod fetch_strategy;

// Re-export commonly used items
pub use crawl_orchestrator::{
    CrawlOrchestrator, ProgressSink, StdoutProgressSink, dedup_preserving_order, parse_url_batch,
};
pub use fetch_strategy::{Backoff, FetchStrategy, ProductSource};
