//! Configuration types

pub mod app;
pub mod engine;
pub mod event_admin;
pub mod logging;

pub use app::AppConfig;
pub use engine::{DispatchMode, EngineConfig};
pub use event_admin::EventAdminConfig;
pub use logging::LoggingConfig;
