//! Configuration infrastructure
//!
//! Contains configuration loading for the rank crawler.
//!
//! Every setting is optional and environment-style (`CRAWL_ENGINE`,
//! `REQUESTS_ATTEMPTS`, ...). Values are layered with the `config` crate on
//! top of the constants in [`defaults`]. A malformed value falls back to its
//! default with a warning instead of aborting the run.

#![allow(clippy::uninlined_format_args)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
}

/// Page acquisition method selected for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchEngine {
    /// Lightweight HTTP fetch only
    #[default]
    Requests,
    /// Full browser automation only
    Selenium,
    /// HTTP first, browser when blocked and the fallback is allowed
    Auto,
}

impl FetchEngine {
    /// Parse an engine name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "selenium" | "browser" => Some(Self::Selenium),
            "auto" => Some(Self::Auto),
            "requests" | "http" => Some(Self::Requests),
            _ => None,
        }
    }
}

impl std::fmt::Display for FetchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requests => write!(f, "requests"),
            Self::Selenium => write!(f, "selenium"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub crawler: CrawlerConfig,
    pub logging: LoggingConfig,

    /// Problems found while loading, logged once the subscriber is up
    #[serde(skip)]
    pub warnings: Vec<String>,
}

/// SQLite file location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl DatabaseConfig {
    /// SQLx connection URL for the configured file
    pub fn url(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

/// Crawl pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Fetch engine selection
    pub engine: FetchEngine,

    /// Permit the browser fallback when `engine` is `auto`
    pub allow_selenium_fallback: bool,

    /// Attempt budget of one lightweight fetch invocation (>= 1)
    pub requests_attempts: u32,

    /// Attempt budget of one browser fetch invocation (0 disables it)
    pub selenium_attempts: u32,

    /// Pause after every processed queue item in milliseconds
    pub crawl_delay_ms: u64,

    /// How many times one URL may be requeued after failing
    pub max_url_retries: u32,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_seconds: u64,

    /// Bounds of the randomized backoff between fetch attempts
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,

    /// Optional JSON list of user-agent strings fetched at startup
    pub user_agents_url: Option<String>,

    /// Optional JSON locator table replacing the built-in one
    pub locators_path: Option<PathBuf>,

    /// Try to solve CAPTCHA images with OCR during browser fetches
    pub ocr_enabled: bool,

    /// Tesseract executable used by the OCR solver
    pub tesseract_path: String,
}

impl CrawlerConfig {
    pub fn crawl_delay(&self) -> Duration {
        Duration::from_millis(self.crawl_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            engine: FetchEngine::Requests,
            allow_selenium_fallback: defaults::ALLOW_SELENIUM_FALLBACK,
            requests_attempts: defaults::REQUESTS_ATTEMPTS,
            selenium_attempts: defaults::SELENIUM_ATTEMPTS,
            crawl_delay_ms: defaults::CRAWL_DELAY_MS,
            max_url_retries: defaults::MAX_URL_RETRIES,
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            backoff_min_ms: defaults::BACKOFF_MIN_MS,
            backoff_max_ms: defaults::BACKOFF_MAX_MS,
            user_agents_url: None,
            locators_path: None,
            ocr_enabled: false,
            tesseract_path: defaults::TESSERACT_PATH.to_string(),
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for the log file; next to the executable when unset
    pub log_dir: Option<PathBuf>,

    /// Module-specific log level filters (e.g., "sqlx": "warn", "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("chromiumoxide".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: PathBuf::from(defaults::DB_PATH),
            },
            crawler: CrawlerConfig::default(),
            logging: LoggingConfig::default(),
            warnings: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(None)
    }

    /// Load configuration from an explicit variable map instead of the
    /// process environment (used by tests and embedding callers)
    pub fn from_source(vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true).source(vars))
            .build()?;

        let mut config = Self::default();
        let warnings = &mut config.warnings;

        config.database.path = optional_string(&settings, "db_path")
            .map(PathBuf::from)
            .unwrap_or(config.database.path);

        let crawler = &mut config.crawler;
        if let Some(engine) = optional_string(&settings, "crawl_engine") {
            crawler.engine = FetchEngine::from_name(&engine).unwrap_or_else(|| {
                warnings.push(format!("Unknown crawl engine '{}', using 'requests'", engine));
                FetchEngine::Requests
            });
        }
        crawler.allow_selenium_fallback =
            value_or(&settings, warnings, "allow_selenium_fallback", crawler.allow_selenium_fallback);
        crawler.requests_attempts =
            count_or(&settings, warnings, "requests_attempts", i64::from(crawler.requests_attempts)).max(1);
        crawler.selenium_attempts =
            count_or(&settings, warnings, "selenium_attempts", i64::from(crawler.selenium_attempts));
        crawler.crawl_delay_ms = u64::from(count_or(
            &settings,
            warnings,
            "crawl_delay_ms",
            i64::try_from(crawler.crawl_delay_ms).unwrap_or(i64::MAX),
        ));
        crawler.max_url_retries =
            count_or(&settings, warnings, "max_url_retries", i64::from(crawler.max_url_retries));
        crawler.request_timeout_seconds = u64::from(count_or(
            &settings,
            warnings,
            "request_timeout_seconds",
            i64::try_from(crawler.request_timeout_seconds).unwrap_or(i64::MAX),
        ))
        .max(1);
        crawler.backoff_min_ms = u64::from(count_or(
            &settings,
            warnings,
            "backoff_min_ms",
            i64::try_from(crawler.backoff_min_ms).unwrap_or(i64::MAX),
        ));
        crawler.backoff_max_ms = u64::from(count_or(
            &settings,
            warnings,
            "backoff_max_ms",
            i64::try_from(crawler.backoff_max_ms).unwrap_or(i64::MAX),
        ))
        .max(crawler.backoff_min_ms);
        crawler.user_agents_url = optional_string(&settings, "user_agents_url");
        crawler.locators_path = optional_string(&settings, "locators_path").map(PathBuf::from);
        crawler.ocr_enabled = value_or(&settings, warnings, "ocr_enabled", crawler.ocr_enabled);
        if let Some(path) = optional_string(&settings, "tesseract_path") {
            crawler.tesseract_path = path;
        }

        let logging = &mut config.logging;
        if let Some(level) = optional_string(&settings, "log_level") {
            logging.level = level.to_lowercase();
        }
        logging.json_format = value_or(&settings, warnings, "log_json", logging.json_format);
        logging.file_output = value_or(&settings, warnings, "log_file", logging.file_output);
        logging.log_dir = optional_string(&settings, "log_dir").map(PathBuf::from);

        Ok(config)
    }
}

/// Non-empty string value for `key`, if present
fn optional_string(settings: &config::Config, key: &str) -> Option<String> {
    settings
        .get_string(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn value_or<T>(settings: &config::Config, warnings: &mut Vec<String>, key: &str, default: T) -> T
where
    T: for<'de> Deserialize<'de> + std::fmt::Debug,
{
    match settings.get::<T>(key) {
        Ok(value) => value,
        Err(config::ConfigError::NotFound(_)) => default,
        Err(e) => {
            warnings.push(format!(
                "Invalid value for {}: {} (using default {:?})",
                key.to_uppercase(),
                e,
                default
            ));
            default
        }
    }
}

/// Non-negative count for `key`; negative values clamp to zero
fn count_or(settings: &config::Config, warnings: &mut Vec<String>, key: &str, default: i64) -> u32 {
    let value = value_or::<i64>(settings, warnings, key, default);
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Default configuration values
pub mod defaults {
    /// Default SQLite database location
    pub const DB_PATH: &str = "data/database/database.db";

    /// Browser fallback in `auto` mode is opt-in
    pub const ALLOW_SELENIUM_FALLBACK: bool = false;

    /// Default lightweight fetch attempt budget
    pub const REQUESTS_ATTEMPTS: u32 = 6;

    /// Default browser fetch attempt budget (disabled)
    pub const SELENIUM_ATTEMPTS: u32 = 0;

    /// Default pause after each queue item in milliseconds
    pub const CRAWL_DELAY_MS: u64 = 200;

    /// Default per-URL requeue budget
    pub const MAX_URL_RETRIES: u32 = 10;

    /// Default HTTP request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 10;

    /// Default randomized backoff bounds between fetch attempts
    pub const BACKOFF_MIN_MS: u64 = 500;
    pub const BACKOFF_MAX_MS: u64 = 1500;

    /// Default OCR executable
    pub const TESSERACT_PATH: &str = "tesseract";

    // Log configuration defaults
    /// Default log level
    pub const LOG_LEVEL: &str = "info";

    /// Default JSON format setting
    pub const LOG_JSON_FORMAT: bool = false;

    /// Default console output setting
    pub const LOG_CONSOLE_OUTPUT: bool = true;

    /// Default file output setting
    pub const LOG_FILE_OUTPUT: bool = false;

    /// Log file name
    pub const LOG_FILE_NAME: &str = "rank-crawler.log";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = AppConfig::from_source(Some(HashMap::new())).unwrap();

        assert_eq!(config.database.path, PathBuf::from("data/database/database.db"));
        assert_eq!(config.crawler.engine, FetchEngine::Requests);
        assert!(!config.crawler.allow_selenium_fallback);
        assert_eq!(config.crawler.requests_attempts, 6);
        assert_eq!(config.crawler.selenium_attempts, 0);
        assert_eq!(config.crawler.crawl_delay_ms, 200);
        assert_eq!(config.crawler.max_url_retries, 10);
        assert_eq!(config.crawler.request_timeout_seconds, 10);
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn test_environment_overrides() {
        let config = AppConfig::from_source(Some(vars(&[
            ("DB_PATH", "/tmp/ranks.db"),
            ("CRAWL_ENGINE", "AUTO"),
            ("ALLOW_SELENIUM_FALLBACK", "true"),
            ("REQUESTS_ATTEMPTS", "3"),
            ("SELENIUM_ATTEMPTS", "2"),
            ("CRAWL_DELAY_MS", "0"),
            ("MAX_URL_RETRIES", "4"),
        ])))
        .unwrap();

        assert_eq!(config.database.url(), "sqlite:/tmp/ranks.db");
        assert_eq!(config.crawler.engine, FetchEngine::Auto);
        assert!(config.crawler.allow_selenium_fallback);
        assert_eq!(config.crawler.requests_attempts, 3);
        assert_eq!(config.crawler.selenium_attempts, 2);
        assert_eq!(config.crawler.crawl_delay_ms, 0);
        assert_eq!(config.crawler.max_url_retries, 4);
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = AppConfig::from_source(Some(vars(&[
            ("CRAWL_ENGINE", "teleport"),
            ("REQUESTS_ATTEMPTS", "0"),
            ("CRAWL_DELAY_MS", "soon"),
            ("MAX_URL_RETRIES", "-5"),
        ])))
        .unwrap();

        assert_eq!(config.crawler.engine, FetchEngine::Requests);
        assert_eq!(config.crawler.requests_attempts, 1);
        assert_eq!(config.crawler.crawl_delay_ms, 200);
        assert_eq!(config.crawler.max_url_retries, 0);

        assert_eq!(config.warnings.len(), 2);
        assert!(config.warnings[0].contains("teleport"));
        assert!(config.warnings[1].contains("CRAWL_DELAY_MS"));
    }

    #[test]
    fn test_backoff_bounds_are_ordered() {
        let config = AppConfig::from_source(Some(vars(&[
            ("BACKOFF_MIN_MS", "900"),
            ("BACKOFF_MAX_MS", "100"),
        ])))
        .unwrap();

        assert_eq!(config.crawler.backoff_min_ms, 900);
        assert_eq!(config.crawler.backoff_max_ms, 900);
    }
}
