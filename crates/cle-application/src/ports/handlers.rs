//! Custom Instance Handler Ports
//!
//! A [`HandlerFactory`] registered with the engine under an id creates one
//! [`InstanceHandler`] per instance of every factory that names that id.
//! Factories naming an id nobody provides wait until it shows up.

use std::sync::Weak;

use cle_domain::error::{CallbackError, CallbackResult};
use cle_domain::value_objects::Properties;

use crate::component::instance::StoredInstance;

/// Creates custom handlers for instances
pub trait HandlerFactory: Send + Sync {
    /// Id factories use to ask for this handler
    fn handler_id(&self) -> &str;

    fn create_handler(
        &self,
        context: &HandlerContext,
    ) -> Result<Box<dyn InstanceHandler>, CallbackError>;
}

/// Per-instance hook into the lifecycle
pub trait InstanceHandler: Send {
    /// Whether this handler lets the instance be valid
    fn is_valid(&self) -> bool {
        true
    }

    /// Before the `validate` callback; an error makes the instance erroneous
    fn pre_validate(&mut self) -> CallbackResult {
        Ok(())
    }

    /// After the instance became valid and registered its services
    fn post_validate(&mut self) {}

    /// Before the instance invalidates
    fn pre_invalidate(&mut self) {}

    /// After the instance invalidated
    fn post_invalidate(&mut self) {}

    /// The instance is being killed
    fn stop(&mut self) {}
}

/// What a handler factory knows about the instance it serves
pub struct HandlerContext {
    pub instance: String,
    pub factory: String,
    pub properties: Properties,
    pub trigger: LifecycleTrigger,
}

/// Lets a custom handler ask its instance to re-check its validity
#[derive(Clone)]
pub struct LifecycleTrigger {
    instance: Weak<StoredInstance>,
}

impl LifecycleTrigger {
    pub(crate) fn new(instance: Weak<StoredInstance>) -> Self {
        Self { instance }
    }

    /// Re-evaluate the instance after [`InstanceHandler::is_valid`] changed
    pub fn request_check(&self) {
        if let Some(instance) = self.instance.upgrade() {
            instance.request_check();
        }
    }
}
