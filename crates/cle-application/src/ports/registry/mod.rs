//! Compile-Time Factory Registry
//!
//! Crates declare component factories with linkme distributed slices; the
//! engine registers them all with
//! [`Engine::register_linked_factories`](crate::engine::Engine::register_linked_factories).
//!
//! ```ignore
//! use cle_application::ports::registry::{COMPONENT_FACTORIES, ComponentFactoryEntry};
//!
//! #[linkme::distributed_slice(COMPONENT_FACTORIES)]
//! static CLOCK_FACTORY: ComponentFactoryEntry = ComponentFactoryEntry {
//!     name: "clock-factory",
//!     bundle: "clock",
//!     description: "Wall clock service",
//!     build: || ComponentBuilder::of::<WallClock>("clock-factory").provides("clock").build(),
//! };
//! ```

/// Factory entries and lookup helpers
pub mod factories;

pub use factories::{COMPONENT_FACTORIES, ComponentFactoryEntry, list_linked_factories};
