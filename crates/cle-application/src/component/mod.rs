//! Components
//!
//! Descriptors say what a factory builds; stored instances run the
//! lifecycle of one built component.

pub mod descriptor;
pub(crate) mod instance;

pub use descriptor::{
    ComponentBuilder, ComponentDescriptor, Constructor, Instantiation, ProvidedSpec,
    RequirementSpec,
};
pub use instance::LifecycleOutcome;
