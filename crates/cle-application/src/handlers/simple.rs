//! Single-service dependency

use cle_domain::filter::Filter;
use cle_domain::value_objects::{DependencyKind, Properties, Requirement};

use super::{Binding, BindingChange, DependencyHandler, Injected, Selector};
use crate::registry::{ServiceReference, ServiceRegistry};

/// Binds the best match and keeps it until it goes away.
///
/// A better-ranked arrival does not displace the current binding; use
/// [`BestDependency`](super::BestDependency) for that.
pub struct SimpleDependency {
    field: String,
    requirement: Requirement,
    kind: DependencyKind,
    selector: Selector,
    bound: Option<Binding>,
}

impl SimpleDependency {
    pub fn new(field: String, requirement: Requirement) -> Self {
        let selector = Selector::new(requirement.filter().cloned());
        Self {
            field,
            requirement,
            kind: DependencyKind::Simple,
            selector,
            bound: None,
        }
    }

    /// Replace the current binding by the best candidate other than `departed`
    fn replace(&mut self, registry: &ServiceRegistry, departed: Binding) -> Vec<BindingChange> {
        match self
            .selector
            .best(registry, self.requirement.specification(), Some(departed.id()))
        {
            Some(next) => {
                self.bound = Some(next.clone());
                vec![BindingChange::Rebound {
                    old: departed,
                    new: next,
                    immediate: self.requirement.is_immediate_rebind(),
                }]
            }
            None => vec![BindingChange::Unbound(departed)],
        }
    }
}

impl super::Refilter for SimpleDependency {
    fn set_selector(&mut self, selector: Selector) {
        self.selector = selector;
    }

    fn reevaluate(&mut self, registry: &ServiceRegistry) -> Vec<BindingChange> {
        let spec = self.requirement.specification().to_string();
        match self.bound.take() {
            Some(current) if self.selector.accepts_reference(&spec, &current.reference) => {
                self.bound = Some(current);
                Vec::new()
            }
            Some(current) => self.replace(registry, current),
            None => self.try_binding(registry),
        }
    }
}

impl DependencyHandler for SimpleDependency {
    fn field(&self) -> &str {
        &self.field
    }

    fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    fn kind(&self) -> &DependencyKind {
        &self.kind
    }

    fn current_filter(&self) -> Option<&Filter> {
        self.selector.filter()
    }

    fn accepts(&self, specification: &str, properties: &Properties) -> bool {
        self.selector
            .accepts(self.requirement.specification(), specification, properties)
    }

    fn try_binding(&mut self, registry: &ServiceRegistry) -> Vec<BindingChange> {
        if self.bound.is_some() {
            return Vec::new();
        }
        match self.selector.best(registry, self.requirement.specification(), None) {
            Some(binding) => {
                self.bound = Some(binding.clone());
                vec![BindingChange::Bound(binding)]
            }
            None => Vec::new(),
        }
    }

    fn on_service_registered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange> {
        if self.bound.is_some() {
            return Vec::new();
        }
        match Binding::resolve(registry, reference) {
            Some(binding) => {
                self.bound = Some(binding.clone());
                vec![BindingChange::Bound(binding)]
            }
            None => Vec::new(),
        }
    }

    fn on_service_unregistered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange> {
        match self.bound.take() {
            Some(current) if current.id() == reference.id() => self.replace(registry, current),
            other => {
                self.bound = other;
                Vec::new()
            }
        }
    }

    fn on_service_modified(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
        previous: &Properties,
    ) -> Vec<BindingChange> {
        match &self.bound {
            Some(current) if current.id() == reference.id() => vec![BindingChange::Updated {
                binding: current.clone(),
                previous: previous.clone(),
            }],
            _ => self.on_service_registered(registry, reference),
        }
    }

    fn is_satisfied(&self) -> bool {
        self.requirement.is_optional() || self.bound.is_some()
    }

    fn value(&self) -> Injected {
        self.bound
            .as_ref()
            .map_or(Injected::None, |b| Injected::Service(b.service.clone()))
    }

    fn bindings(&self) -> Vec<Binding> {
        self.bound.iter().cloned().collect()
    }

    fn clear(&mut self) -> Vec<BindingChange> {
        self.bound.take().map(BindingChange::Unbound).into_iter().collect()
    }
}
