//! Infrastructure layer for database access, page retrieval, and parsing
//!
//! This module provides the SQLite store, the HTTP and browser fetchers,
//! HTML parsing, configuration and logging.

pub mod browser_client;
pub mod config; // Environment-driven settings
pub mod database_connection;
pub mod logging;
pub mod ocr;
pub mod parsing;
pub mod parsing_error;
pub mod product_repository;
pub mod simple_http_client;
pub mod user_agents;

// Re-export commonly used items
#[cfg(feature = "browser")]
pub use browser_client::ChromeBrowser;
pub use browser_client::{BrowserClientConfig, BrowserFetcher, UnavailableBrowser};
pub use config::{AppConfig, CrawlerConfig, FetchEngine, LoggingConfig};
pub use database_connection::DatabaseConnection;
pub use logging::{get_log_directory, init_logging_with_config};
pub use ocr::{ChallengeSolver, TesseractSolver};
pub use parsing::{BlockDetector, LocatorTable, PageClass, ProductPage, ProductPageParser};
pub use product_repository::ProductRepository;
pub use simple_http_client::{FetchedPage, HttpClient, HttpClientConfig, PageFetcher};
pub use user_agents::{UserAgentPool, UserAgentProvider};
