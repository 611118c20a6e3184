//! Engine configuration types

use std::time::Duration;

use cle_application::EngineOptions;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DISPATCH_QUEUE_CAPACITY, DEFAULT_TEMPORAL_TIMEOUT_MS};

/// Thread on which lifecycle listeners are called
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// On the thread that caused the transition
    #[default]
    Inline,
    /// On one background thread, in publication order
    Queued,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lifecycle event delivery
    pub dispatch: DispatchMode,

    /// Events buffered by the queued dispatcher before delivery falls back
    /// to the publishing thread
    pub dispatch_queue_capacity: usize,

    /// Register every factory declared with `#[distributed_slice(COMPONENT_FACTORIES)]`
    pub register_linked_factories: bool,

    /// Timeout of temporal dependencies declared without one
    pub default_temporal_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::Inline,
            dispatch_queue_capacity: DEFAULT_DISPATCH_QUEUE_CAPACITY,
            register_linked_factories: true,
            default_temporal_timeout_ms: DEFAULT_TEMPORAL_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    /// Options handed to the engine
    pub fn options(&self) -> EngineOptions {
        EngineOptions {
            default_temporal_timeout: Duration::from_millis(self.default_temporal_timeout_ms),
        }
    }
}
