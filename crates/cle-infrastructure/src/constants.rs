//! Infrastructure layer constants
//!
//! Contains constants that are part of the infrastructure implementation.
//! Property keys understood by the engine itself are defined in
//! `cle_domain::constants`.

// ============================================================================
// CONFIGURATION CONSTANTS
// ============================================================================

/// Default configuration file name
pub const DEFAULT_CONFIG_FILENAME: &str = "cle.toml";

/// Default configuration directory name
pub const DEFAULT_CONFIG_DIR: &str = "cle";

/// Environment variable prefix for configuration (`CLE__SECTION__KEY`)
pub const CONFIG_ENV_PREFIX: &str = "CLE";

/// Separator between the prefix, sections and keys of environment variables
pub const CONFIG_ENV_SEPARATOR: &str = "__";

// ============================================================================
// LOGGING CONSTANTS
// ============================================================================

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable overriding the configured log filter
pub const LOG_FILTER_ENV_VAR: &str = "CLE_LOG";

/// Number of rotated log files kept by default
pub const LOG_MAX_FILES: usize = 7;

/// File name prefix used when the configured log path has none
pub const LOG_DEFAULT_FILE_PREFIX: &str = "cle";

// ============================================================================
// ENGINE CONSTANTS
// ============================================================================

/// Capacity of the queued lifecycle dispatcher
pub const DEFAULT_DISPATCH_QUEUE_CAPACITY: usize = 1024;

/// Timeout of temporal dependencies declared without one (milliseconds)
pub const DEFAULT_TEMPORAL_TIMEOUT_MS: u64 = 10_000;

/// Name of the queued lifecycle dispatcher thread
pub const DISPATCHER_THREAD_NAME: &str = "cle-lifecycle";

// ============================================================================
// EVENT ADMIN CONSTANTS
// ============================================================================

/// Worker threads delivering posted events
pub const DEFAULT_EVENT_WORKERS: usize = 2;

/// Capacity of the posted events queue
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 4096;

/// Time given to event workers to finish on shutdown (milliseconds)
pub const DEFAULT_EVENT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Thread name prefix of event workers
pub const EVENT_WORKER_THREAD_PREFIX: &str = "cle-event";

/// Specification under which the event admin registers itself
pub const EVENT_ADMIN_SPECIFICATION: &str = "cle.event.admin";

/// Event property holding the time the event was sent (epoch milliseconds)
pub const EVENT_TIMESTAMP: &str = "timestamp";
