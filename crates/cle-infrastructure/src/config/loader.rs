//! Layered configuration through figment

use std::env;
use std::path::{Path, PathBuf};

use cle_domain::error::{Error, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};

use crate::config::AppConfig;
use crate::constants::{
    CONFIG_ENV_PREFIX, CONFIG_ENV_SEPARATOR, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILENAME,
};
use crate::error_ext::ErrorContext;
use crate::logging::{log_config_loaded, parse_log_level};

/// Builds an [`AppConfig`] from defaults, a TOML file and the environment
///
/// Later sources win:
///
/// 1. `AppConfig::default()`
/// 2. the explicit file, or else the first of `./cle.toml`,
///    `./config/cle.toml` and `<user config dir>/cle/cle.toml`
/// 3. `CLE__SECTION__KEY` variables, e.g. `CLE__ENGINE__DISPATCH=queued`
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            env_prefix: CONFIG_ENV_PREFIX.to_string(),
        }
    }

    /// Read this file instead of searching the default locations
    ///
    /// A missing file is reported and skipped; defaults and environment
    /// still apply.
    pub fn with_config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Prefix of the environment variables, without the `__` separator
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// The layered sources, before extraction
    pub fn figment(&self) -> Figment {
        let defaults = Figment::from(Serialized::defaults(AppConfig::default()));
        let with_file = match self.config_file() {
            Some(path) => defaults.merge(Toml::file(path)),
            None => defaults,
        };
        let prefix = format!("{}{CONFIG_ENV_SEPARATOR}", self.env_prefix);
        with_file.merge(Env::prefixed(&prefix).split(CONFIG_ENV_SEPARATOR))
    }

    /// Extract and validate the configuration
    pub fn load(&self) -> Result<AppConfig> {
        let config: AppConfig = self
            .figment()
            .extract()
            .config_context("invalid configuration")?;
        validate_app_config(&config)?;
        Ok(config)
    }

    /// Write `config` as pretty TOML, loadable again through [`with_config_path`](Self::with_config_path)
    pub fn save_to_file(&self, config: &AppConfig, path: impl AsRef<Path>) -> Result<()> {
        let text = toml::to_string_pretty(config).context("cannot render configuration")?;
        std::fs::write(path.as_ref(), text).io_context(format!(
            "cannot write configuration to {}",
            path.as_ref().display()
        ))
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// File to merge, if any, logging the outcome
    fn config_file(&self) -> Option<PathBuf> {
        if let Some(explicit) = &self.config_path {
            let found = explicit.exists();
            log_config_loaded(explicit, found);
            return found.then(|| explicit.clone());
        }
        let discovered = discover_config_file()?;
        log_config_loaded(&discovered, true);
        Some(discovered)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_config_file() -> Option<PathBuf> {
    let cwd = env::current_dir().ok()?;
    [
        Some(cwd.join(DEFAULT_CONFIG_FILENAME)),
        Some(cwd.join("config").join(DEFAULT_CONFIG_FILENAME)),
        dirs::config_dir().map(|dir| dir.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILENAME)),
    ]
    .into_iter()
    .flatten()
    .find(|path| path.is_file())
}

/// Reject settings the engine cannot run with
pub fn validate_app_config(config: &AppConfig) -> Result<()> {
    parse_log_level(&config.logging.level)?;
    validate_engine_config(config)?;
    validate_event_admin_config(config)?;
    Ok(())
}

fn validate_engine_config(config: &AppConfig) -> Result<()> {
    if config.engine.dispatch_queue_capacity == 0 {
        return Err(Error::configuration(
            "Lifecycle dispatch queue capacity cannot be 0",
        ));
    }
    if config.engine.default_temporal_timeout_ms == 0 {
        return Err(Error::configuration(
            "Default temporal timeout cannot be 0",
        ));
    }
    Ok(())
}

fn validate_event_admin_config(config: &AppConfig) -> Result<()> {
    let event_admin = &config.event_admin;
    if !event_admin.enabled {
        return Ok(());
    }
    if event_admin.workers == 0 {
        return Err(Error::configuration(
            "Event admin needs at least one worker when enabled",
        ));
    }
    if event_admin.queue_capacity == 0 {
        return Err(Error::configuration(
            "Event admin queue capacity cannot be 0 when enabled",
        ));
    }
    if event_admin.shutdown_timeout_ms == 0 {
        return Err(Error::configuration(
            "Event admin shutdown timeout cannot be 0 when enabled",
        ));
    }
    Ok(())
}
