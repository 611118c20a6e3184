//! # Component Lifecycle Engine
//!
//! Components declare the services they need and the services they provide.
//! The engine watches the service registry and moves every component
//! instance between valid and invalid as its dependencies come and go,
//! rebinding them live.
//!
//! ## Features
//!
//! - **Service Registry**: ranked, filtered (LDAP) lookups with change notifications
//! - **Dependencies**: simple, aggregate, best-ranked, broadcast, keyed map,
//!   variable filter and temporal
//! - **Lifecycle**: validation callbacks, erroneous state with retry, lifecycle events
//! - **Factories**: bundles, waiting list, custom instance handlers, link-time registration
//! - **Infrastructure**: figment configuration, tracing logging, queued
//!   dispatch and a topic event admin
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use cle::prelude::*;
//!
//! trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//! }
//! struct Fixed;
//! impl Clock for Fixed {
//!     fn now(&self) -> u64 { 42 }
//! }
//!
//! #[derive(Default)]
//! struct Report;
//! impl Component for Report {}
//!
//! let engine = Engine::new();
//! let descriptor = ComponentBuilder::of::<Report>("report-factory")
//!     .requires("clock", "clock")
//!     .build()
//!     .unwrap();
//! engine.register_factory("reports", descriptor).unwrap();
//!
//! let state = engine.instantiate("report-factory", "report", Properties::new()).unwrap();
//! assert_eq!(state, ComponentState::Invalid);
//!
//! let clock = ServiceObject::new::<dyn Clock>(Arc::new(Fixed));
//! engine.registry().register("clock", clock, Properties::new());
//! assert_eq!(engine.get_instance_details("report").unwrap().state, ComponentState::Valid);
//! ```
//!
//! ## Architecture
//!
//! - `domain` - value objects, LDAP filters, lifecycle events and errors
//! - `application` - registry, dependency handlers, instances and the engine
//! - `infrastructure` - configuration, logging, event dispatch and bootstrap

/// Domain layer - value objects, filters, events and errors
///
/// Re-exports from the domain crate for convenience
pub mod domain {
    pub use cle_domain::*;
}

/// Application layer - the engine
///
/// Re-exports from the application crate for convenience
pub mod application {
    pub use cle_application::*;
}

/// Infrastructure layer - configuration, logging, event dispatch
///
/// Re-exports from the infrastructure crate for convenience
pub mod infrastructure {
    pub use cle_infrastructure::*;
}

// Re-export commonly used domain types at the crate root
pub use domain::{CallbackError, CallbackResult, Error, Result};

// Re-export the engine and its bootstrap at the crate root
pub use application::Engine;
pub use infrastructure::{AppConfig, ConfigLoader, EngineContext, build_engine};

/// Types needed to declare components and drive an engine
pub mod prelude {
    pub use cle_application::component::{ComponentBuilder, ComponentDescriptor};
    pub use cle_application::handlers::{BroadcastProxy, Injected, TemporalProxy};
    pub use cle_application::ports::{
        COMPONENT_FACTORIES, Component, ComponentContext, ComponentFactoryEntry, LifecycleListener,
    };
    pub use cle_application::registry::{ServiceReference, ServiceRegistration, ServiceRegistry};
    pub use cle_application::{Engine, EngineOptions};
    pub use cle_domain::events::{LifecycleEvent, LifecycleEventKind};
    pub use cle_domain::filter::Filter;
    pub use cle_domain::value_objects::{
        ComponentState, Properties, Requirement, ServiceObject, properties,
    };
    pub use cle_domain::{CallbackError, CallbackResult, Error, Result};
    pub use cle_infrastructure::{AppConfig, ConfigLoader, EngineContext, build_engine};
}
