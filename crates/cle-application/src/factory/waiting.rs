//! Waiting list

use cle_domain::error::Result;
use cle_domain::value_objects::{Properties, WaitingDetails};

use crate::engine::Engine;

/// Instantiation requests kept until their factory is available.
///
/// An entry becomes an instance as soon as its factory is usable, and goes
/// back to pending when the factory leaves.
pub struct WaitingList<'a> {
    engine: &'a Engine,
}

impl<'a> WaitingList<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Store a request; the instance is created right away if possible.
    ///
    /// Fails with a `Value` error if the name is already in use. A failure
    /// to build the instance is logged and leaves the entry pending.
    pub fn add(&self, factory: &str, name: &str, properties: Properties) -> Result<()> {
        self.engine.add_waiting(factory, name, properties)
    }

    /// Drop a request, killing its instance if it has one
    pub fn remove(&self, name: &str) -> Result<()> {
        self.engine.remove_waiting(name)
    }

    pub fn entries(&self) -> Vec<WaitingDetails> {
        self.engine.get_waiting_components()
    }
}
