//! Broadcast dependency
//!
//! The component receives a single [`BroadcastProxy`] that forwards each call
//! to every bound service, in lookup order.

use std::fmt;
use std::sync::Arc;

use cle_domain::error::{CallbackError, CallbackResult};
use cle_domain::value_objects::{DependencyKind, Properties, Requirement, ServiceObject};
use parking_lot::RwLock;
use tracing::warn;

use super::{AggregateDependency, Binding, BindingChange, DependencyHandler, Injected};
use crate::registry::{ServiceReference, ServiceRegistry};

/// Forwards calls to every service bound to a broadcast dependency
#[derive(Clone)]
pub struct BroadcastProxy {
    specification: Arc<str>,
    targets: Arc<RwLock<Vec<ServiceObject>>>,
    muffle_errors: bool,
}

impl BroadcastProxy {
    fn new(specification: &str, muffle_errors: bool) -> Self {
        Self {
            specification: Arc::from(specification),
            targets: Arc::new(RwLock::new(Vec::new())),
            muffle_errors,
        }
    }

    /// Call `f` on every target that is a `T`.
    ///
    /// Returns `Ok(false)` when no target was called. Without error muffling the
    /// first failure stops the broadcast and is returned; with muffling,
    /// failures are logged and the remaining targets are still called.
    pub fn call<T, F>(&self, f: F) -> Result<bool, CallbackError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&T) -> CallbackResult,
    {
        // snapshot so callees may trigger rebinding without deadlocking
        let targets = self.targets.read().clone();
        let mut called = false;
        for target in targets.iter().filter_map(ServiceObject::downcast::<T>) {
            called = true;
            if let Err(e) = f(&*target) {
                if !self.muffle_errors {
                    return Err(e);
                }
                warn!(specification = %self.specification, error = %e, "Broadcast target failed");
            }
        }
        Ok(called)
    }

    pub fn specification(&self) -> &str {
        &self.specification
    }

    /// Number of bound targets
    pub fn len(&self) -> usize {
        self.targets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn refresh(&self, bindings: &[Binding]) {
        *self.targets.write() = bindings.iter().map(|b| b.service.clone()).collect();
    }
}

impl fmt::Debug for BroadcastProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastProxy")
            .field("specification", &self.specification)
            .field("targets", &self.len())
            .field("muffle_errors", &self.muffle_errors)
            .finish()
    }
}

/// Aggregate dependency exposed through a [`BroadcastProxy`].
///
/// The proxy is injected once and stays the same object for the lifetime of
/// the instance; its target list follows the bindings.
pub struct BroadcastDependency {
    inner: AggregateDependency,
    proxy: BroadcastProxy,
}

impl BroadcastDependency {
    pub fn new(field: String, requirement: Requirement, muffle_errors: bool) -> Self {
        let proxy = BroadcastProxy::new(requirement.specification(), muffle_errors);
        Self {
            inner: AggregateDependency::new(field, requirement)
                .with_kind(DependencyKind::Broadcast { muffle_errors }),
            proxy,
        }
    }

    fn refreshed(&self, changes: Vec<BindingChange>) -> Vec<BindingChange> {
        self.proxy.refresh(&self.inner.bindings());
        changes
    }
}

impl DependencyHandler for BroadcastDependency {
    fn field(&self) -> &str {
        self.inner.field()
    }

    fn requirement(&self) -> &Requirement {
        self.inner.requirement()
    }

    fn kind(&self) -> &DependencyKind {
        self.inner.kind()
    }

    fn try_binding(&mut self, registry: &ServiceRegistry) -> Vec<BindingChange> {
        let changes = self.inner.try_binding(registry);
        self.refreshed(changes)
    }

    fn on_service_registered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange> {
        let changes = self.inner.on_service_registered(registry, reference);
        self.refreshed(changes)
    }

    fn on_service_unregistered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange> {
        let changes = self.inner.on_service_unregistered(registry, reference);
        self.refreshed(changes)
    }

    fn on_service_modified(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
        previous: &Properties,
    ) -> Vec<BindingChange> {
        let changes = self.inner.on_service_modified(registry, reference, previous);
        self.refreshed(changes)
    }

    fn is_satisfied(&self) -> bool {
        self.inner.is_satisfied()
    }

    fn value(&self) -> Injected {
        Injected::Broadcast(self.proxy.clone())
    }

    fn bindings(&self) -> Vec<Binding> {
        self.inner.bindings()
    }

    fn clear(&mut self) -> Vec<BindingChange> {
        let changes = self.inner.clear();
        self.refreshed(changes)
    }
}
