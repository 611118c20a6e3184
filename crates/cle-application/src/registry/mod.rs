//! Service Registry
//!
//! Process-wide store of registered services. Every mutation assigns or
//! preserves a registration id and notifies listeners while holding one
//! reentrant dispatch lock, so all listeners observe the same total order.
//!
//! ```text
//!   register / update / unregister
//!               │
//!               ▼
//!   ┌──────────────────────┐   read    ┌──────────────────────┐
//!   │ dispatch lock        │──────────▶│ state (RwLock)       │
//!   │ (ReentrantMutex)     │           │ ids, sorted indexes, │
//!   │  fires listeners     │           │ listeners            │
//!   └──────────┬───────────┘           └──────────────────────┘
//!              │ deferred tasks run after the outermost level exits
//!              ▼
//!   instance mailboxes drained without the registry lock
//! ```
//!
//! Lookups are ordered by ranking (descending) then id (ascending).

mod events;
mod reference;

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use cle_domain::constants::{OBJECTCLASS, SERVICE_ID};
use cle_domain::error::{Error, Result};
use cle_domain::filter::Filter;
use cle_domain::value_objects::{Properties, ServiceId, ServiceObject};
use parking_lot::{ReentrantMutex, RwLock};
use serde_json::Value;
use tracing::{debug, error};

pub use events::{DispatchScope, ListenerId, ServiceEvent, ServiceEventKind, ServiceListener};
pub use reference::{ServiceReference, ServiceRegistration};

use events::DispatchGate;

struct ListenerEntry {
    id: ListenerId,
    listener: Arc<dyn ServiceListener>,
    specification: Option<String>,
    filter: Option<Filter>,
}

impl ListenerEntry {
    fn wants(&self, specification: &str) -> bool {
        self.specification
            .as_deref()
            .is_none_or(|wanted| wanted == specification)
    }

    fn matches(&self, properties: &Properties) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(properties))
    }
}

#[derive(Default)]
struct RegistryState {
    last_id: ServiceId,
    last_listener_id: u64,
    services: HashMap<ServiceId, ServiceReference>,
    ordered: Vec<ServiceReference>,
    by_specification: HashMap<String, Vec<ServiceReference>>,
    listeners: Vec<ListenerEntry>,
}

impl RegistryState {
    fn insert(&mut self, reference: ServiceReference) {
        insert_sorted(&mut self.ordered, reference.clone());
        insert_sorted(
            self.by_specification
                .entry(reference.specification().to_string())
                .or_default(),
            reference.clone(),
        );
        self.services.insert(reference.id(), reference);
    }

    fn remove(&mut self, reference: &ServiceReference) {
        let id = reference.id();
        self.services.remove(&id);
        self.ordered.retain(|r| r.id() != id);
        if let Some(list) = self.by_specification.get_mut(reference.specification()) {
            list.retain(|r| r.id() != id);
            if list.is_empty() {
                self.by_specification.remove(reference.specification());
            }
        }
    }
}

fn insert_sorted(list: &mut Vec<ServiceReference>, reference: ServiceReference) {
    let key = reference.sort_key();
    let position = list.partition_point(|r| r.sort_key() < key);
    list.insert(position, reference);
}

fn with_reserved_keys(mut properties: Properties, id: ServiceId, specification: &str) -> Properties {
    properties.insert(SERVICE_ID.to_string(), Value::from(id));
    properties.insert(OBJECTCLASS.to_string(), Value::from(specification));
    properties
}

/// Store of registered services
pub struct ServiceRegistry {
    dispatch: ReentrantMutex<DispatchGate>,
    state: RwLock<RegistryState>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            dispatch: ReentrantMutex::new(DispatchGate::default()),
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Register a service and notify matching listeners before returning.
    ///
    /// The registry adds the reserved `service.id` and `objectClass` keys to
    /// the given properties.
    pub fn register<S: Into<String>>(
        &self,
        specification: S,
        service: ServiceObject,
        properties: Properties,
    ) -> ServiceRegistration {
        let specification = specification.into();
        let reference = self.with_dispatch(|gate| {
            let reference = {
                let mut state = self.state.write();
                state.last_id += 1;
                let id = state.last_id;
                let properties = with_reserved_keys(properties, id, &specification);
                let reference = ServiceReference::new(id, specification, properties, service);
                state.insert(reference.clone());
                reference
            };
            debug!(
                service_id = reference.id(),
                specification = reference.specification(),
                ranking = reference.ranking(),
                "Service registered"
            );

            let properties = Arc::new(reference.properties());
            self.fire(gate, &reference, &properties, None, |listener| {
                listener
                    .matches(&properties)
                    .then_some(ServiceEventKind::Registered)
            });
            reference
        });
        ServiceRegistration::new(reference)
    }

    /// Unregister a service.
    ///
    /// Listeners are notified while the service can still be looked up.
    /// Returns `false`, without notifying anyone, if it was already gone.
    pub fn unregister(&self, registration: &ServiceRegistration) -> bool {
        self.with_dispatch(|gate| {
            let reference = registration.reference();
            if !self.state.read().services.contains_key(&reference.id()) {
                return false;
            }

            let properties = Arc::new(reference.properties());
            self.fire(gate, reference, &properties, None, |listener| {
                listener
                    .matches(&properties)
                    .then_some(ServiceEventKind::Unregistering)
            });

            self.state.write().remove(reference);
            reference.release();
            debug!(
                service_id = reference.id(),
                specification = reference.specification(),
                "Service unregistered"
            );
            true
        })
    }

    /// Replace the registrant-owned properties of a service.
    ///
    /// Listeners whose filter matches the new properties receive
    /// [`ServiceEventKind::Modified`]; those that only matched the previous
    /// properties receive [`ServiceEventKind::ModifiedEndMatch`].
    pub fn update_properties(
        &self,
        registration: &ServiceRegistration,
        properties: Properties,
    ) -> Result<()> {
        self.with_dispatch(|gate| {
            let reference = registration.reference();
            let previous = {
                let mut state = self.state.write();
                if !state.services.contains_key(&reference.id()) {
                    return Err(Error::not_found(format!("service {}", reference.id())));
                }
                let properties =
                    with_reserved_keys(properties, reference.id(), reference.specification());
                let previous = reference.replace_properties(properties);
                state.remove(reference);
                state.insert(reference.clone());
                previous
            };
            debug!(
                service_id = reference.id(),
                ranking = reference.ranking(),
                "Service properties updated"
            );

            let current = Arc::new(reference.properties());
            let previous = Arc::new(previous);
            self.fire(gate, reference, &current, Some(&previous), |listener| {
                if listener.matches(&current) {
                    Some(ServiceEventKind::Modified)
                } else if listener.matches(&previous) {
                    Some(ServiceEventKind::ModifiedEndMatch)
                } else {
                    None
                }
            });
            Ok(())
        })
    }

    /// Find services, ordered by ranking (descending) then id (ascending).
    ///
    /// Blank filter text means no filter; malformed text fails with
    /// [`Error::InvalidFilter`].
    pub fn find(
        &self,
        specification: Option<&str>,
        filter: Option<&str>,
    ) -> Result<Vec<ServiceReference>> {
        let filter = match filter {
            Some(text) => Filter::parse_optional(text)?,
            None => None,
        };
        Ok(self.find_with(specification, filter.as_ref()))
    }

    /// Find services with an already parsed filter
    pub fn find_with(
        &self,
        specification: Option<&str>,
        filter: Option<&Filter>,
    ) -> Vec<ServiceReference> {
        let state = self.state.read();
        let candidates = match specification {
            Some(spec) => state
                .by_specification
                .get(spec)
                .map_or(&[][..], Vec::as_slice),
            None => state.ordered.as_slice(),
        };
        candidates
            .iter()
            .filter(|r| filter.is_none_or(|f| r.matches_filter(f)))
            .cloned()
            .collect()
    }

    /// Best service for a specification and filter
    pub fn find_first(
        &self,
        specification: Option<&str>,
        filter: Option<&Filter>,
    ) -> Option<ServiceReference> {
        let state = self.state.read();
        let candidates = match specification {
            Some(spec) => state
                .by_specification
                .get(spec)
                .map_or(&[][..], Vec::as_slice),
            None => state.ordered.as_slice(),
        };
        candidates
            .iter()
            .find(|r| filter.is_none_or(|f| r.matches_filter(f)))
            .cloned()
    }

    /// Service object behind a reference, if it is still registered
    pub fn get_service(&self, reference: &ServiceReference) -> Option<ServiceObject> {
        reference.service()
    }

    /// Subscribe to changes of services matching a specification and filter
    /// (`None` accepts everything)
    pub fn add_service_listener(
        &self,
        listener: Arc<dyn ServiceListener>,
        specification: Option<&str>,
        filter: Option<Filter>,
    ) -> ListenerId {
        self.with_dispatch(|_| {
            let mut state = self.state.write();
            state.last_listener_id += 1;
            let id = ListenerId(state.last_listener_id);
            state.listeners.push(ListenerEntry {
                id,
                listener,
                specification: specification.map(str::to_string),
                filter,
            });
            id
        })
    }

    /// Unsubscribe a listener; returns `false` if it was unknown
    pub fn remove_service_listener(&self, id: ListenerId) -> bool {
        self.with_dispatch(|_| {
            let mut state = self.state.write();
            let before = state.listeners.len();
            state.listeners.retain(|entry| entry.id != id);
            state.listeners.len() != before
        })
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.state.read().services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn with_dispatch<R>(&self, operation: impl FnOnce(&DispatchGate) -> R) -> R {
        let gate = self.dispatch.lock();
        gate.enter();
        let result = operation(&gate);
        let deferred = gate.exit();
        drop(gate);
        for task in deferred {
            task();
        }
        result
    }

    fn fire(
        &self,
        gate: &DispatchGate,
        reference: &ServiceReference,
        properties: &Arc<Properties>,
        previous: Option<&Arc<Properties>>,
        kind_for: impl Fn(&ListenerEntry) -> Option<ServiceEventKind>,
    ) {
        let targets: Vec<(Arc<dyn ServiceListener>, ServiceEventKind)> = {
            let state = self.state.read();
            state
                .listeners
                .iter()
                .filter(|entry| entry.wants(reference.specification()))
                .filter_map(|entry| kind_for(entry).map(|kind| (Arc::clone(&entry.listener), kind)))
                .collect()
        };

        let scope = DispatchScope::new(gate);
        for (listener, kind) in targets {
            let event = ServiceEvent {
                kind,
                reference: reference.clone(),
                properties: Arc::clone(properties),
                previous_properties: previous.cloned(),
            };
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                listener.service_changed(&event, &scope);
            }));
            if outcome.is_err() {
                error!(
                    service_id = reference.id(),
                    kind = ?kind,
                    "Service listener panicked"
                );
            }
        }
    }
}
