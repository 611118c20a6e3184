//! Error handling types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine-wide result
pub type Result<T> = std::result::Result<T, Error>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by registry, engine and administrative calls
#[derive(Error, Debug)]
pub enum Error {
    /// Reading or writing a file (configuration, log output) failed
    #[error("I/O error: {message}")]
    Io {
        /// What the engine was doing
        message: String,
        /// Underlying failure
        #[source]
        source: Option<BoxedSource>,
    },

    /// A property value could not be converted to or from JSON
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Malformed LDAP filter
    #[error("Invalid filter '{filter}': {message}")]
    InvalidFilter {
        /// The filter text that failed to parse
        filter: String,
        /// Parser diagnostic
        message: String,
    },

    /// Unknown factory, or a component that could not be built
    #[error("Type error: {message}")]
    Type { message: String },

    /// Invalid value, e.g. an instance name already in use
    #[error("Value error: {message}")]
    Value { message: String },

    /// No instance, factory or service under that name
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// A bounded queue refused new work
    #[error("Capacity exceeded: {message}")]
    Capacity { message: String },

    /// A temporal dependency was not rebound in time
    #[error("No '{specification}' service available after {timeout_ms} ms")]
    TemporalTimeout {
        /// Specification the caller was waiting for
        specification: String,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// Rejected settings or an engine that cannot be set up as asked
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Worker threads, dispatchers and other runtime plumbing
    #[error("Infrastructure error: {message}")]
    Infrastructure {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl Error {
    /// Filter text that does not parse
    pub fn invalid_filter(filter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            filter: filter.into(),
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::Value {
            message: message.into(),
        }
    }

    /// `resource` names the kind and key, e.g. `instance 'reader'`
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn capacity(message: impl Into<String>) -> Self {
        Self::Capacity {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
            source: None,
        }
    }

    /// Runtime plumbing failure caused by `source`
    pub fn infrastructure_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Infrastructure {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

// ============================================================================
// Component Callback Errors
// ============================================================================

/// How far a stop request raised from component code reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopSeverity {
    /// Kill the component that raised the request
    KillComponent,
    /// Shut the whole engine down
    StopEngine,
}

/// Error returned by component code (constructors, lifecycle and binding callbacks)
#[derive(Error, Debug)]
pub enum CallbackError {
    /// The callback failed; the engine logs it and applies the lifecycle rules
    #[error("{message}")]
    Failed {
        /// Description of the failure
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// The callback asks the engine to stop the component or itself
    #[error("stop requested ({severity:?}): {message}")]
    Stop {
        /// Scope of the stop request
        severity: StopSeverity,
        /// Reason given by the component
        message: String,
    },
}

impl CallbackError {
    /// Create a plain callback failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a callback failure wrapping another error
    pub fn failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Failed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Ask the engine to kill the calling component
    pub fn kill_component(message: impl Into<String>) -> Self {
        Self::Stop {
            severity: StopSeverity::KillComponent,
            message: message.into(),
        }
    }

    /// Ask the engine to shut down
    pub fn stop_engine(message: impl Into<String>) -> Self {
        Self::Stop {
            severity: StopSeverity::StopEngine,
            message: message.into(),
        }
    }

    /// Stop severity carried by this error, if any
    pub fn stop_severity(&self) -> Option<StopSeverity> {
        match self {
            Self::Stop { severity, .. } => Some(*severity),
            Self::Failed { .. } => None,
        }
    }
}

impl From<Error> for CallbackError {
    fn from(err: Error) -> Self {
        Self::Failed {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Result of a component callback
pub type CallbackResult = std::result::Result<(), CallbackError>;
