//! Highest-ranked service dependency

use cle_domain::value_objects::{DependencyKind, Properties, Requirement};

use super::{Binding, BindingChange, DependencyHandler, Injected, Selector};
use crate::registry::{ServiceReference, ServiceRegistry};

/// Single binding that always follows the highest-ranked match.
///
/// A switch only happens on a strictly higher ranking: equal rankings keep
/// the current binding.
pub struct BestDependency {
    field: String,
    requirement: Requirement,
    kind: DependencyKind,
    selector: Selector,
    bound: Option<Binding>,
}

impl BestDependency {
    pub fn new(field: String, requirement: Requirement) -> Self {
        let selector = Selector::new(requirement.filter().cloned());
        Self {
            field,
            requirement,
            kind: DependencyKind::Best,
            selector,
            bound: None,
        }
    }

    fn switch_to(&mut self, next: Binding) -> Vec<BindingChange> {
        match self.bound.replace(next.clone()) {
            Some(old) => vec![BindingChange::Rebound {
                old,
                new: next,
                immediate: self.requirement.is_immediate_rebind(),
            }],
            None => vec![BindingChange::Bound(next)],
        }
    }
}

impl DependencyHandler for BestDependency {
    fn field(&self) -> &str {
        &self.field
    }

    fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    fn kind(&self) -> &DependencyKind {
        &self.kind
    }

    fn try_binding(&mut self, registry: &ServiceRegistry) -> Vec<BindingChange> {
        let Some(best) = self.selector.best(registry, self.requirement.specification(), None) else {
            return Vec::new();
        };
        match &self.bound {
            Some(current) if best.reference.ranking() <= current.reference.ranking() => Vec::new(),
            _ => self.switch_to(best),
        }
    }

    fn on_service_registered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange> {
        if let Some(current) = &self.bound {
            if current.id() == reference.id() || reference.ranking() <= current.reference.ranking() {
                return Vec::new();
            }
        }
        match Binding::resolve(registry, reference) {
            Some(binding) => self.switch_to(binding),
            None => Vec::new(),
        }
    }

    fn on_service_unregistered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange> {
        match self.bound.take() {
            Some(old) if old.id() == reference.id() => {
                match self
                    .selector
                    .best(registry, self.requirement.specification(), Some(old.id()))
                {
                    Some(new) => {
                        self.bound = Some(new.clone());
                        vec![BindingChange::Rebound {
                            old,
                            new,
                            immediate: self.requirement.is_immediate_rebind(),
                        }]
                    }
                    None => vec![BindingChange::Unbound(old)],
                }
            }
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
        let Some(current) = self.bound.clone() else {
            return self.on_service_registered(registry, reference);
        };
        if current.id() != reference.id() {
            return self.on_service_registered(registry, reference);
        }

        // the bound service may have lost its rank
        match self
            .selector
            .best(registry, self.requirement.specification(), Some(current.id()))
        {
            Some(other) if other.reference.ranking() > current.reference.ranking() => {
                self.switch_to(other)
            }
            _ => vec![BindingChange::Updated {
                binding: current,
                previous: previous.clone(),
            }],
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
