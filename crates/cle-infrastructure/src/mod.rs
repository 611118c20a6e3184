//! # Infrastructure Layer
//!
//! Cross-cutting technical concerns around the engine.
//!
//! ## Module Categories
//!
//! ### Configuration & Bootstrap
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Figment configuration: defaults, TOML file, environment |
//! | [`bootstrap`] | Builds an engine and its infrastructure from configuration |
//! | [`constants`] | Centralized configuration constants |
//!
//! ### Events
//! | Module | Description |
//! |--------|-------------|
//! | [`events`] | Worker pool, queued lifecycle dispatcher, event admin, lifecycle bridge |
//!
//! ### Observability & Errors
//! | Module | Description |
//! |--------|-------------|
//! | [`logging`] | Structured logging with tracing |
//! | [`error_ext`] | Context helpers for foreign errors |

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod error_ext;
pub mod events;
pub mod logging;

pub use bootstrap::{EngineContext, build_engine};
pub use config::{AppConfig, ConfigLoader};
pub use error_ext::ErrorContext;
