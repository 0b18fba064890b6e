//! Logging system configuration and initialization
//!
//! Console output shares stdout with the JSON progress lines; the caller
//! picks the progress objects out by their leading `{`. An optional file
//! layer writes plain or JSON records next to the executable (or into
//! `LOG_DIR`).

#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use chrono::Utc;
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_appender::{non_blocking, rolling};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::defaults;

// Keeps the non-blocking file writer alive for the life of the process
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

/// UTC timestamps with millisecond precision
struct UtcTimeFormatter;

impl FormatTime for UtcTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Build the level filter.
///
/// `RUST_LOG` wins when set. Otherwise the configured level applies to the
/// crate and the per-module filters quiet chatty dependencies unless the
/// level is `trace`.
pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

        if !config.level.to_lowercase().contains("trace") {
            for (module, level) in &config.module_filters {
                if let Ok(directive) = format!("{}={}", module, level).parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }

        filter
    })
}

/// Plain console layer on stdout, built for whichever stack it joins
fn console_layer<S>(enabled: bool) -> Option<Box<dyn Layer<S> + Send + Sync>>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    enabled.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stdout)
            .with_ansi(false)
            .with_timer(UtcTimeFormatter)
            .with_target(false)
            .boxed()
    })
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LoggingConfig) -> Result<()> {
    let env_filter = build_env_filter(&config);
    let registry = Registry::default().with(env_filter);

    let log_dir = config.log_dir.clone().unwrap_or_else(get_log_directory);

    match (config.file_output, config.console_output) {
        (true, _) => {
            std::fs::create_dir_all(&log_dir)
                .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

            let file_appender = rolling::never(&log_dir, defaults::LOG_FILE_NAME);
            let (file_writer, file_guard) = non_blocking(file_appender);
            LOG_GUARDS
                .lock()
                .map_err(|_| anyhow!("Log guard registry poisoned"))?
                .push(file_guard);

            if config.json_format {
                let file_layer = fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_timer(UtcTimeFormatter)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false);
                registry
                    .with(file_layer)
                    .with(console_layer(config.console_output))
                    .try_init()
                    .map_err(|e| anyhow!("Failed to install subscriber: {}", e))?;
            } else {
                let file_layer = fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_timer(UtcTimeFormatter)
                    .with_target(false)
                    .with_ansi(false);
                registry
                    .with(file_layer)
                    .with(console_layer(config.console_output))
                    .try_init()
                    .map_err(|e| anyhow!("Failed to install subscriber: {}", e))?;
            }
        }
        (false, true) => {
            registry
                .with(console_layer(config.console_output))
                .try_init()
                .map_err(|e| anyhow!("Failed to install subscriber: {}", e))?;
        }
        (false, false) => {
            return Err(anyhow!("No logging output configured"));
        }
    }

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log file: {:?}", log_dir.join(defaults::LOG_FILE_NAME));
    }

    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Rank Crawler ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
}
