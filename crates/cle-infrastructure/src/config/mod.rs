//! Configuration management
//!
//! Configuration is assembled by [`ConfigLoader`] from defaults, a TOML file
//! and `CLE__SECTION__KEY` environment variables, then validated.

pub mod loader;
pub mod types;

pub use loader::{ConfigLoader, validate_app_config};
pub use types::*;
