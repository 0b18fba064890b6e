//! Rank Crawler - E-commerce product crawling with sales-rank history
//!
//! Reads a batch of product page URLs, retrieves each page over plain HTTP
//! or a headless browser, extracts the product fields and keeps them in a
//! SQLite store together with a short history of rank changes.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export the entry points used by the binary
pub use application::{CrawlOrchestrator, FetchStrategy, StdoutProgressSink, parse_url_batch};
pub use domain::{CrawlSummary, ProductRecord, ProgressEvent};
pub use infrastructure::{AppConfig, DatabaseConnection, ProductRepository};
