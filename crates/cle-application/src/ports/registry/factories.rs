//! Component Factory Entries

use cle_domain::error::Result;

use crate::component::ComponentDescriptor;

/// Registry entry for a component factory
///
/// Each entry is submitted with
/// `#[linkme::distributed_slice(COMPONENT_FACTORIES)]`. The `build` function
/// runs when the engine registers linked factories.
pub struct ComponentFactoryEntry {
    /// Factory name, as used by `instantiate`
    pub name: &'static str,
    /// Bundle the factory is registered for
    pub bundle: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Builds the descriptor
    pub build: fn() -> Result<ComponentDescriptor>,
}

// Auto-collection via linkme distributed slices - crates submit entries at compile time
#[linkme::distributed_slice]
pub static COMPONENT_FACTORIES: [ComponentFactoryEntry] = [..];

/// List all linked factories as (name, bundle, description) tuples
pub fn list_linked_factories() -> Vec<(&'static str, &'static str, &'static str)> {
    COMPONENT_FACTORIES
        .iter()
        .map(|e| (e.name, e.bundle, e.description))
        .collect()
}
