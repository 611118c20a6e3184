//! Structured logging with tracing
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` (overridden by
//! `CLE_LOG`), plain or JSON output on stdout and an optional daily rolling
//! file.

use std::ffi::OsStr;
use std::path::Path;

use cle_domain::error::{Error, Result};
use tracing::{Level, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

pub use crate::config::LoggingConfig;
use crate::constants::{LOG_DEFAULT_FILE_PREFIX, LOG_FILTER_ENV_VAR};
use crate::error_ext::ErrorContext;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber described by `config`
///
/// Fails on an unknown level, an unopenable log directory, or when a
/// subscriber is already installed (logging is process-wide).
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let mut layers = vec![console_layer(config.json_format)];
    if let Some(path) = config.file_output.as_deref() {
        let appender = file_appender(path, config.max_files)?;
        layers.push(file_layer(appender, config.json_format));
    }

    Registry::default()
        .with(layers)
        .with(filter)
        .try_init()
        .config_context("log subscriber already installed")?;

    info!(%level, json = config.json_format, "logging initialized");
    Ok(())
}

fn console_layer(json: bool) -> BoxedLayer {
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);
    if json { layer.json().boxed() } else { layer.boxed() }
}

fn file_layer(appender: RollingFileAppender, json: bool) -> BoxedLayer {
    let layer = fmt::layer().with_writer(appender).with_ansi(false);
    if json { layer.json().boxed() } else { layer.boxed() }
}

/// Daily rolling file named after `path`'s stem, keeping `max_files` files
fn file_appender(path: &Path, max_files: usize) -> Result<RollingFileAppender> {
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_stem()
        .unwrap_or_else(|| OsStr::new(LOG_DEFAULT_FILE_PREFIX))
        .to_string_lossy()
        .into_owned();

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(max_files.max(1))
        .build(directory)
        .config_context(format!("cannot open log directory {}", directory.display()))
}

/// Map a configured level name to a [`Level`]; `warning` is accepted for `warn`
pub fn parse_log_level(level: &str) -> Result<Level> {
    let parsed = match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            return Err(Error::configuration(format!(
                "unknown log level '{level}' (expected trace, debug, info, warn or error)"
            )));
        }
    };
    Ok(parsed)
}

/// Report which configuration file was used, or that a requested one is missing
pub fn log_config_loaded(config_path: &Path, found: bool) {
    if found {
        info!(path = %config_path.display(), "configuration file loaded");
    } else {
        warn!(path = %config_path.display(), "configuration file not found, using defaults");
    }
}
