//! Service events and listeners

use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::Arc;

use cle_domain::value_objects::Properties;

use super::ServiceReference;

/// Kind of registry change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceEventKind {
    /// A service was registered
    Registered,
    /// The properties of a service changed and still match the listener
    Modified,
    /// The properties of a service changed and no longer match the listener
    ModifiedEndMatch,
    /// A service is about to be unregistered; it can still be queried
    Unregistering,
}

/// Registry change delivered to a [`ServiceListener`]
#[derive(Clone)]
pub struct ServiceEvent {
    pub kind: ServiceEventKind,
    pub reference: ServiceReference,
    /// Properties of the service when the event was fired
    pub properties: Arc<Properties>,
    /// Properties before a modification
    pub previous_properties: Option<Arc<Properties>>,
}

impl fmt::Debug for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEvent")
            .field("kind", &self.kind)
            .field("service_id", &self.reference.id())
            .field("specification", &self.reference.specification())
            .finish_non_exhaustive()
    }
}

/// Identifier of a registered service listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

/// Observer of registry changes.
///
/// Listeners run while the registry dispatch lock is held. They may read the
/// registry but must not mutate it: follow-up work goes through
/// [`DispatchScope::defer`].
pub trait ServiceListener: Send + Sync {
    fn service_changed(&self, event: &ServiceEvent, scope: &DispatchScope<'_>);
}

impl<F> ServiceListener for F
where
    F: Fn(&ServiceEvent, &DispatchScope<'_>) + Send + Sync,
{
    fn service_changed(&self, event: &ServiceEvent, scope: &DispatchScope<'_>) {
        self(event, scope);
    }
}

pub(crate) type DeferredTask = Box<dyn FnOnce() + Send>;

/// State protected by the registry dispatch lock
#[derive(Default)]
pub(crate) struct DispatchGate {
    depth: Cell<usize>,
    deferred: RefCell<Vec<DeferredTask>>,
}

impl DispatchGate {
    pub(crate) fn enter(&self) {
        self.depth.set(self.depth.get() + 1);
    }

    /// Leave one dispatch level; the outermost level collects the deferred tasks
    pub(crate) fn exit(&self) -> Vec<DeferredTask> {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        if depth == 0 {
            self.deferred.take()
        } else {
            Vec::new()
        }
    }

    fn defer(&self, task: DeferredTask) {
        self.deferred.borrow_mut().push(task);
    }
}

/// Handle given to listeners during a dispatch
pub struct DispatchScope<'a> {
    gate: &'a DispatchGate,
}

impl<'a> DispatchScope<'a> {
    pub(crate) fn new(gate: &'a DispatchGate) -> Self {
        Self { gate }
    }

    /// Run `task` on this thread once the outermost dispatch has released the
    /// registry lock. Tasks run in the order they were deferred.
    pub fn defer<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.gate.defer(Box::new(task));
    }
}
