//! Main application configuration

use serde::{Deserialize, Serialize};

use super::{EngineConfig, EventAdminConfig, LoggingConfig};

/// Main application configuration
///
/// Every section has defaults, so an empty TOML file is a valid
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Engine configuration
    pub engine: EngineConfig,

    /// Event admin configuration
    pub event_admin: EventAdminConfig,
}
