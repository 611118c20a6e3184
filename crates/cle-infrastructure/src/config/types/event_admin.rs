//! Event admin configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_EVENT_SHUTDOWN_TIMEOUT_MS, DEFAULT_EVENT_WORKERS,
};

/// Event admin configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventAdminConfig {
    /// Start the event admin and republish lifecycle events on topics
    pub enabled: bool,

    /// Threads delivering posted events
    pub workers: usize,

    /// Posted events waiting for a worker
    pub queue_capacity: usize,

    /// Keep delivering after a handler failed
    pub muffle_errors: bool,

    /// Time given to workers to finish on shutdown
    pub shutdown_timeout_ms: u64,
}

impl Default for EventAdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: DEFAULT_EVENT_WORKERS,
            queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            muffle_errors: true,
            shutdown_timeout_ms: DEFAULT_EVENT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl EventAdminConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
