//! Domain Value Objects
//!
//! Immutable values exchanged between the registry, the dependency handlers
//! and the administration surface.
//!
//! ## Value Objects
//!
//! | Value Object | Description |
//! |--------------|-------------|
//! | [`Properties`] | Ordered property bag of a service or an instance |
//! | [`ServiceObject`] | Type-erased, shareable service handle |
//! | [`Requirement`] | What a component needs from the registry |
//! | [`DependencyKind`] | Which handler resolves a requirement |
//! | [`ComponentState`] | Lifecycle state of a component instance |
//! | [`InstanceDetails`] | Administrative snapshot of an instance |

/// Component states and administrative snapshots
pub mod component;
/// Property bags
pub mod properties;
/// Requirements and dependency kinds
pub mod requirement;
/// Type-erased service handles
pub mod service;

pub use component::{
    BindingDetails, ComponentState, DependencyDetails, FactoryDetails, FactoryStatus,
    InstanceDetails, ProvidedDetails, RequirementDetails, WaitingDetails, WaitingStatus,
};
pub use properties::{Properties, properties, property_key, ranking_of};
pub use requirement::{DependencyKind, Requirement};
pub use service::{ServiceId, ServiceObject};
