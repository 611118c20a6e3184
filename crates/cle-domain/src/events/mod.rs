//! Lifecycle Events
//!
//! Immutable records of what happened to factories and component instances.
//! The engine hands them to every lifecycle listener, in the order the
//! transitions happened for a given instance.
//!
//! | Event | Description |
//! |-------|-------------|
//! | [`LifecycleEvent`] | One factory or instance transition |
//! | [`LifecycleEventKind`] | Which transition happened |

/// Lifecycle event definitions
pub mod lifecycle;

pub use lifecycle::{LifecycleEvent, LifecycleEventKind};
