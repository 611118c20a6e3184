//! Ports
//!
//! Contracts between the engine and the code it hosts.
//!
//! | Port | Description |
//! |------|-------------|
//! | [`Component`] | Callbacks of a component implementation |
//! | [`ComponentContext`] | What a callback may ask the engine to do |
//! | [`LifecycleListener`] | Observer of lifecycle events |
//! | [`EventDispatcher`] | Strategy delivering lifecycle events |
//! | [`HandlerFactory`] / [`InstanceHandler`] | Custom per-instance handlers |
//! | [`registry::COMPONENT_FACTORIES`] | Compile-time factory registrations |

/// Component callbacks
pub mod component;
/// Lifecycle event listeners and dispatchers
pub mod events;
/// Custom instance handlers
pub mod handlers;
/// Compile-time factory registry
pub mod registry;

pub use component::{Component, ComponentContext};
pub use events::{EventDelivery, EventDispatcher, LifecycleListener};
pub use handlers::{HandlerContext, HandlerFactory, InstanceHandler, LifecycleTrigger};
pub use registry::{COMPONENT_FACTORIES, ComponentFactoryEntry, list_linked_factories};
