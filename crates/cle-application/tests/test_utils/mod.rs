//! Shared fixtures for the cle-application test suites
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cle_application::component::ComponentBuilder;
use cle_application::handlers::Injected;
use cle_application::ports::{Component, ComponentContext, LifecycleListener};
use cle_application::registry::{ServiceReference, ServiceRegistration, ServiceRegistry};
use cle_application::Engine;
use cle_domain::value_objects::{Properties, ServiceObject, properties};
use cle_domain::{CallbackError, CallbackResult, LifecycleEvent, LifecycleEventKind};
use parking_lot::Mutex;
use serde_json::Value;

// ============================================================================
// Services
// ============================================================================

/// Capability used as service specification `greeter`
pub trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

pub struct Named(pub String);

impl Greeter for Named {
    fn greet(&self) -> String {
        self.0.clone()
    }
}

pub fn greeter(name: &str) -> ServiceObject {
    ServiceObject::new::<dyn Greeter>(Arc::new(Named(name.to_string())))
}

/// Register a `greeter` service with a ranking
pub fn register_ranked(registry: &ServiceRegistry, name: &str, ranking: i64) -> ServiceRegistration {
    registry.register(
        "greeter",
        greeter(name),
        properties([("name", Value::from(name)), ("service.ranking", Value::from(ranking))]),
    )
}

pub fn greet_all(value: &Injected) -> Vec<String> {
    value.services::<dyn Greeter>().iter().map(|g| g.greet()).collect()
}

// ============================================================================
// Lifecycle event log
// ============================================================================

#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl EventLog {
    pub fn attach(engine: &Engine) -> Arc<Self> {
        let log = Arc::new(Self::default());
        engine.add_listener(Arc::clone(&log) as Arc<dyn LifecycleListener>);
        log
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    /// Kinds of the events of one instance, in publication order
    pub fn kinds_for(&self, instance: &str) -> Vec<LifecycleEventKind> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.instance.as_deref() == Some(instance))
            .map(|e| e.kind)
            .collect()
    }

    /// Kinds of the factory events of one factory
    pub fn factory_kinds(&self, factory: &str) -> Vec<LifecycleEventKind> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.instance.is_none() && e.factory == factory)
            .map(|e| e.kind)
            .collect()
    }

    /// `(kind, service id)` of the binding events of one instance
    pub fn bindings_for(&self, instance: &str) -> Vec<(LifecycleEventKind, u64)> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.instance.as_deref() == Some(instance))
            .filter_map(|e| e.service_id.map(|id| (e.kind, id)))
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl LifecycleListener for EventLog {
    fn lifecycle_event(&self, event: &LifecycleEvent) {
        self.events.lock().push(event.clone());
    }
}

// ============================================================================
// Witness component
// ============================================================================

/// Records what the engine does to a component
#[derive(Default)]
pub struct Witness {
    injected: Mutex<HashMap<String, Injected>>,
    calls: Mutex<Vec<String>>,
    constructed: AtomicUsize,
    configured: Mutex<Option<Properties>>,
}

impl Witness {
    pub fn injected(&self, field: &str) -> Injected {
        self.injected.lock().get(field).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    pub fn configured(&self) -> Option<Properties> {
        self.configured.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

/// Component reporting to a [`Witness`].
///
/// `validate` fails while the instance property `fail` is `true`; a
/// `fail_with` of `"kill"` or `"stop"` turns the failure into a stop request.
/// Every provided specification is served by a [`Named`] greeter.
pub struct WitnessComponent {
    witness: Arc<Witness>,
}

impl Component for WitnessComponent {
    fn configure(&mut self, properties: &Properties, _ctx: &mut ComponentContext<'_>) -> CallbackResult {
        *self.witness.configured.lock() = Some(properties.clone());
        self.witness.record("configure".to_string());
        Ok(())
    }

    fn inject(&mut self, field: &str, value: Injected) {
        self.witness.injected.lock().insert(field.to_string(), value);
    }

    fn bind(
        &mut self,
        field: &str,
        _service: &ServiceObject,
        reference: &ServiceReference,
        _ctx: &mut ComponentContext<'_>,
    ) -> CallbackResult {
        self.witness.record(format!("bind:{field}:{}", reference.id()));
        Ok(())
    }

    fn update(
        &mut self,
        field: &str,
        _service: &ServiceObject,
        reference: &ServiceReference,
        _previous: &Properties,
        _ctx: &mut ComponentContext<'_>,
    ) -> CallbackResult {
        self.witness.record(format!("update:{field}:{}", reference.id()));
        Ok(())
    }

    fn unbind(
        &mut self,
        field: &str,
        _service: &ServiceObject,
        reference: &ServiceReference,
        _ctx: &mut ComponentContext<'_>,
    ) -> CallbackResult {
        self.witness.record(format!("unbind:{field}:{}", reference.id()));
        Ok(())
    }

    fn validate(&mut self, ctx: &mut ComponentContext<'_>) -> CallbackResult {
        self.witness.record("validate".to_string());
        if ctx.property("fail") != Some(&Value::Bool(true)) {
            return Ok(());
        }
        match ctx.property("fail_with").and_then(Value::as_str) {
            Some("kill") => Err(CallbackError::kill_component("asked to die")),
            Some("stop") => Err(CallbackError::stop_engine("asked to stop")),
            _ => Err(CallbackError::failed("validation refused")),
        }
    }

    fn invalidate(&mut self, _ctx: &mut ComponentContext<'_>) -> CallbackResult {
        self.witness.record("invalidate".to_string());
        Ok(())
    }

    fn provide(&self, _specification: &str) -> Option<ServiceObject> {
        Some(greeter("provided"))
    }
}

/// Builder of a factory whose instances report to `witness`
pub fn witnessed_factory(name: &str, witness: &Arc<Witness>) -> ComponentBuilder {
    let witness = Arc::clone(witness);
    ComponentBuilder::new(name, move |_| {
        witness.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(WitnessComponent {
            witness: Arc::clone(&witness),
        }) as Box<dyn Component>)
    })
}

/// Component doing nothing at all
#[derive(Default)]
pub struct Idle;

impl Component for Idle {}
