//! Application Layer - Component Lifecycle Engine
//!
//! This crate hosts the moving parts of the engine: the service registry,
//! the dependency handlers, the per-instance state machine and the engine
//! that owns factories and instances.
//!
//! ## Architecture
//!
//! - `registry`: services, references, listeners and ordered dispatch
//! - `handlers`: one dependency handler per requirement of an instance
//! - `component`: component descriptors and stored instances
//! - `factory`: factory ownership, queues and the waiting list
//! - `engine`: administrative surface tying everything together
//! - `ports`: contracts implemented by hosted code and outer layers
//!
//! ## Dependencies
//!
//! This crate depends only on:
//! - `cle-domain`: value objects, LDAP filters, lifecycle events and errors
//! - Pure Rust libraries for locking, serialization and logging

pub mod component;
pub mod dispatch;
pub mod engine;
pub mod factory;
pub mod handlers;
pub mod matcher;
pub mod ports;
pub mod registry;

pub use component::{ComponentBuilder, ComponentDescriptor, LifecycleOutcome};
pub use dispatch::{EventHub, InlineEventDispatcher, LifecycleListenerId};
pub use engine::{DEFAULT_TEMPORAL_TIMEOUT, Engine, EngineOptions};
pub use factory::WaitingList;
pub use handlers::{BroadcastProxy, Injected, TemporalProxy};
pub use ports::*;
pub use registry::{
    ServiceEvent, ServiceEventKind, ServiceListener, ServiceReference, ServiceRegistration,
    ServiceRegistry,
};
