//! Component Port
//!
//! A component is the user code an instance wraps. The engine drives it
//! through the [`Component`] callbacks, always under the lock of its
//! instance, so two callbacks of one component never run concurrently.

use cle_domain::error::CallbackResult;
use cle_domain::value_objects::{Properties, ServiceObject};
use serde_json::Value;

use crate::handlers::Injected;
use crate::registry::{ServiceReference, ServiceRegistry};

/// Callbacks of a component implementation.
///
/// Every callback has a default that does nothing, except
/// [`provide`](Self::provide) which must be implemented by components that
/// declare provided services.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use cle_application::ports::Component;
/// use cle_domain::value_objects::ServiceObject;
///
/// trait Clock: Send + Sync {
///     fn now(&self) -> u64;
/// }
///
/// #[derive(Default)]
/// struct FixedClock;
///
/// impl Clock for FixedClock {
///     fn now(&self) -> u64 { 42 }
/// }
///
/// impl Component for FixedClock {
///     fn provide(&self, specification: &str) -> Option<ServiceObject> {
///         (specification == "clock").then(|| ServiceObject::new::<dyn Clock>(Arc::new(FixedClock)))
///     }
/// }
/// ```
pub trait Component: Send + 'static {
    /// Instance properties were set or changed by an administrator
    fn configure(&mut self, _properties: &Properties, _ctx: &mut ComponentContext<'_>) -> CallbackResult {
        Ok(())
    }

    /// New value of a dependency field
    fn inject(&mut self, _field: &str, _value: Injected) {}

    /// A service was bound to `field`
    fn bind(
        &mut self,
        _field: &str,
        _service: &ServiceObject,
        _reference: &ServiceReference,
        _ctx: &mut ComponentContext<'_>,
    ) -> CallbackResult {
        Ok(())
    }

    /// The properties of a service bound to `field` changed
    fn update(
        &mut self,
        _field: &str,
        _service: &ServiceObject,
        _reference: &ServiceReference,
        _previous: &Properties,
        _ctx: &mut ComponentContext<'_>,
    ) -> CallbackResult {
        Ok(())
    }

    /// A service was removed from `field`
    fn unbind(
        &mut self,
        _field: &str,
        _service: &ServiceObject,
        _reference: &ServiceReference,
        _ctx: &mut ComponentContext<'_>,
    ) -> CallbackResult {
        Ok(())
    }

    /// Every mandatory dependency is bound; an error makes the instance erroneous
    fn validate(&mut self, _ctx: &mut ComponentContext<'_>) -> CallbackResult {
        Ok(())
    }

    /// A mandatory dependency is gone or the instance is being stopped
    fn invalidate(&mut self, _ctx: &mut ComponentContext<'_>) -> CallbackResult {
        Ok(())
    }

    /// Service object to register for a provided specification
    fn provide(&self, _specification: &str) -> Option<ServiceObject> {
        None
    }

    /// A provided service was registered
    fn post_registration(
        &mut self,
        _reference: &ServiceReference,
        _ctx: &mut ComponentContext<'_>,
    ) -> CallbackResult {
        Ok(())
    }

    /// A provided service was unregistered
    fn post_unregistration(
        &mut self,
        _reference: &ServiceReference,
        _ctx: &mut ComponentContext<'_>,
    ) -> CallbackResult {
        Ok(())
    }
}

/// Request queued by a callback, applied once the callback returned
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ContextRequest {
    SetProperty(String, Value),
    SetController(String, bool),
}

/// View of its instance given to every component callback
pub struct ComponentContext<'a> {
    name: &'a str,
    factory: &'a str,
    properties: &'a Properties,
    registry: &'a ServiceRegistry,
    requests: Vec<ContextRequest>,
}

impl<'a> ComponentContext<'a> {
    pub(crate) fn new(
        name: &'a str,
        factory: &'a str,
        properties: &'a Properties,
        registry: &'a ServiceRegistry,
    ) -> Self {
        Self {
            name,
            factory,
            properties,
            registry,
            requests: Vec::new(),
        }
    }

    /// Instance name
    pub fn name(&self) -> &str {
        self.name
    }

    /// Factory name
    pub fn factory(&self) -> &str {
        self.factory
    }

    /// Instance properties
    pub fn properties(&self) -> &Properties {
        self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Registry the instance lives in
    pub fn registry(&self) -> &ServiceRegistry {
        self.registry
    }

    /// Change an instance property once the callback returns.
    ///
    /// Provided services and variable filters see the new value; `configure`
    /// is not called again.
    pub fn set_property<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) {
        self.requests
            .push(ContextRequest::SetProperty(key.into(), value.into()));
    }

    /// Switch a provided service on or off once the callback returns
    pub fn set_controller<S: Into<String>>(&mut self, specification: S, value: bool) {
        self.requests
            .push(ContextRequest::SetController(specification.into(), value));
    }

    pub(crate) fn into_requests(self) -> Vec<ContextRequest> {
        self.requests
    }
}
