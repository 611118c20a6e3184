//! Component states and administrative snapshots

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value_objects::{Properties, ServiceId};

/// Lifecycle state of a component instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentState {
    /// Built and configured, dependencies not yet satisfied
    Instantiated,
    /// Running its validation callbacks
    Validating,
    /// Every mandatory dependency is bound; services are provided
    Valid,
    /// A mandatory dependency is missing
    Invalid,
    /// Validation failed; waits for a retry
    Erroneous,
    /// Destroyed; the instance will not come back
    Killed,
}

impl ComponentState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instantiated => "INSTANTIATED",
            Self::Validating => "VALIDATING",
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Erroneous => "ERRONEOUS",
            Self::Killed => "KILLED",
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of registering a factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactoryStatus {
    /// The factory can be instantiated
    Active,
    /// Another bundle already provides a factory with this name
    Queued,
    /// A custom instance handler the factory needs is not registered yet
    AwaitingHandlers,
}

/// Status of a waiting list entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitingStatus {
    /// The factory is not available yet
    Pending,
    /// The instance exists
    Instantiated,
}

/// A service bound to a dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingDetails {
    pub service_id: ServiceId,
    pub specification: String,
    /// Map key, for keyed dependencies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Snapshot of one dependency of an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDetails {
    pub field: String,
    pub specification: String,
    /// Filter currently applied, rendered for variable filters
    pub filter: Option<String>,
    pub kind: String,
    pub optional: bool,
    pub aggregate: bool,
    pub satisfied: bool,
    pub bindings: Vec<BindingDetails>,
}

/// Snapshot of a provided service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidedDetails {
    pub specification: String,
    /// Registration id while the service is registered
    pub service_id: Option<ServiceId>,
    /// Controller value, when the service has one
    pub controller: Option<bool>,
}

/// Administrative snapshot of a component instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDetails {
    pub name: String,
    pub factory: String,
    pub bundle: String,
    pub state: ComponentState,
    pub properties: Properties,
    pub dependencies: Vec<DependencyDetails>,
    pub provides: Vec<ProvidedDetails>,
    /// Custom instance handlers attached to the instance
    pub handlers: Vec<String>,
    /// Last validation failure, kept while the instance is erroneous
    pub error_trace: Option<String>,
}

/// Requirement of a factory, as shown by the administration surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementDetails {
    pub field: String,
    pub specification: String,
    pub filter: Option<String>,
    pub kind: String,
    pub optional: bool,
    pub aggregate: bool,
    pub immediate_rebind: bool,
}

/// Administrative snapshot of a factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactoryDetails {
    pub name: String,
    pub bundle: String,
    pub requirements: Vec<RequirementDetails>,
    pub provides: Vec<String>,
    pub properties: Properties,
    pub handlers: Vec<String>,
    pub instances: Vec<String>,
    /// Bundles waiting to provide the same factory name
    pub queued_bundles: Vec<String>,
}

/// Entry of the waiting list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitingDetails {
    pub factory: String,
    pub name: String,
    pub properties: Properties,
    pub status: WaitingStatus,
}
