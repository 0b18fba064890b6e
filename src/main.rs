//! Command-line entry point
//!
//! Reads a JSON array of product URLs from stdin, crawls them and prints
//! progress events to stdout. Exits non-zero when no URL was persisted.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};

use rank_crawler_lib::infrastructure::logging::{init_logging_with_config, log_system_info};
use rank_crawler_lib::{
    AppConfig, CrawlOrchestrator, DatabaseConnection, FetchStrategy, ProductRepository,
    StdoutProgressSink, parse_url_batch,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging_with_config(config.logging.clone()) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }
    log_system_info();
    for warning in &config.warnings {
        warn!("{}", warning);
    }

    match run(&config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &AppConfig) -> Result<bool> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read URL batch from stdin")?;
    let urls = parse_url_batch(&input).context("Invalid URL batch")?;
    info!("Received {} URLs", urls.len());

    let database_url = config.database.url();
    let db = DatabaseConnection::new(&database_url)
        .await
        .with_context(|| format!("Failed to open database {}", database_url))?;
    db.ensure_schema().await?;

    let repository = Arc::new(ProductRepository::new(Arc::new(db.pool().clone())));
    if let Err(e) = repository.save_url_list(&urls).await {
        warn!("Failed to record URL list: {:#}", e);
    }

    let source = FetchStrategy::from_config(&config.crawler).await?;
    let orchestrator = CrawlOrchestrator::new(
        Arc::new(source),
        repository,
        Arc::new(StdoutProgressSink),
        &config.crawler,
    );

    let summary = orchestrator.run(&urls).await;
    Ok(summary.is_success())
}
