//! # Domain Layer
//!
//! Core types of the Component Lifecycle Engine. This crate has no knowledge
//! of threads, registries or configuration files: it only defines what a
//! service, a requirement, a filter and a lifecycle event are.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`filter`] | LDAP filter parser and evaluator |
//! | [`value_objects`] | Properties, service handles, requirements, component states |
//! | [`events`] | Lifecycle events emitted by the engine |
//! | [`error`] | Error taxonomy and callback errors |
//! | [`constants`] | Reserved property keys and well-known names |
//!
//! ## Example
//!
//! ```
//! use cle_domain::filter::Filter;
//! use cle_domain::value_objects::properties;
//!
//! let filter = Filter::parse("(&(lang=en)(rank>=2))").unwrap();
//! let props = properties([("lang", "en".into()), ("rank", 3.into())]);
//! assert!(filter.matches(&props));
//! ```

/// Domain layer constants
pub mod constants;
/// Error handling types
pub mod error;
/// Lifecycle events
pub mod events;
/// LDAP filter grammar and evaluation
pub mod filter;
/// Value objects
pub mod value_objects;

pub use constants::*;
pub use error::{CallbackError, CallbackResult, Error, Result, StopSeverity};
pub use events::{LifecycleEvent, LifecycleEventKind};
pub use filter::Filter;
pub use value_objects::*;
