//! Lifecycle event definitions

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::ServiceId;

/// Kind of lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEventKind {
    /// A factory became available
    Registered,
    /// A factory went away
    Unregistered,
    /// An instance was created
    Instantiated,
    /// A service was injected into a dependency
    Bound,
    /// The properties of a bound service changed
    Updated,
    /// An instance became valid
    Validated,
    /// An instance stopped being valid
    Invalidated,
    /// A service was removed from a dependency
    Unbound,
    /// An instance was destroyed
    Killed,
    /// Validation of an instance failed
    Erroneous,
}

impl LifecycleEventKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 10] = [
        Self::Registered,
        Self::Unregistered,
        Self::Instantiated,
        Self::Bound,
        Self::Updated,
        Self::Validated,
        Self::Invalidated,
        Self::Unbound,
        Self::Killed,
        Self::Erroneous,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "REGISTERED",
            Self::Unregistered => "UNREGISTERED",
            Self::Instantiated => "INSTANTIATED",
            Self::Bound => "BOUND",
            Self::Updated => "UPDATED",
            Self::Validated => "VALIDATED",
            Self::Invalidated => "INVALIDATED",
            Self::Unbound => "UNBOUND",
            Self::Killed => "KILLED",
            Self::Erroneous => "ERRONEOUS",
        }
    }
}

impl fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One factory or instance transition
///
/// # Example
///
/// ```
/// use cle_domain::events::{LifecycleEvent, LifecycleEventKind};
///
/// let event = LifecycleEvent::for_instance(LifecycleEventKind::Bound, "logger-factory", "logger")
///     .with_binding("sink", 7);
/// assert_eq!(event.instance.as_deref(), Some("logger"));
/// assert_eq!(event.service_id, Some(7));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: LifecycleEventKind,
    pub factory: String,
    /// Instance name; absent for factory events
    pub instance: Option<String>,
    /// Service involved in a BOUND, UPDATED or UNBOUND event
    pub service_id: Option<ServiceId>,
    /// Dependency field involved in a BOUND, UPDATED or UNBOUND event
    pub field: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Event about a factory
    pub fn for_factory<F: Into<String>>(kind: LifecycleEventKind, factory: F) -> Self {
        Self {
            kind,
            factory: factory.into(),
            instance: None,
            service_id: None,
            field: None,
            timestamp: Utc::now(),
        }
    }

    /// Event about an instance
    pub fn for_instance<F: Into<String>, I: Into<String>>(
        kind: LifecycleEventKind,
        factory: F,
        instance: I,
    ) -> Self {
        Self {
            instance: Some(instance.into()),
            ..Self::for_factory(kind, factory)
        }
    }

    /// Attach the dependency field and service of a binding event
    pub fn with_binding<S: Into<String>>(mut self, field: S, service_id: ServiceId) -> Self {
        self.field = Some(field.into());
        self.service_id = Some(service_id);
        self
    }
}
