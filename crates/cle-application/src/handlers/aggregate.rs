//! Multi-service dependency

use cle_domain::filter::Filter;
use cle_domain::value_objects::{DependencyKind, Properties, Requirement};

use super::{Binding, BindingChange, DependencyHandler, Injected, Refilter, Selector, sort_bindings};
use crate::registry::{ServiceReference, ServiceRegistry};

/// Binds every matching service, kept in lookup order
pub struct AggregateDependency {
    field: String,
    requirement: Requirement,
    kind: DependencyKind,
    selector: Selector,
    bound: Vec<Binding>,
}

impl AggregateDependency {
    pub fn new(field: String, requirement: Requirement) -> Self {
        let selector = Selector::new(requirement.filter().cloned());
        Self {
            field,
            requirement,
            kind: DependencyKind::Simple,
            selector,
            bound: Vec::new(),
        }
    }

    pub(crate) fn with_kind(mut self, kind: DependencyKind) -> Self {
        self.kind = kind;
        self
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.bound.iter().position(|b| b.id() == id)
    }

    fn add(&mut self, binding: Binding) -> Vec<BindingChange> {
        if self.position(binding.id()).is_some() {
            return Vec::new();
        }
        self.bound.push(binding.clone());
        sort_bindings(&mut self.bound);
        vec![BindingChange::Bound(binding)]
    }
}

impl Refilter for AggregateDependency {
    fn set_selector(&mut self, selector: Selector) {
        self.selector = selector;
    }

    fn reevaluate(&mut self, registry: &ServiceRegistry) -> Vec<BindingChange> {
        let spec = self.requirement.specification().to_string();
        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.bound)
            .into_iter()
            .partition(|b| self.selector.accepts_reference(&spec, &b.reference));
        self.bound = kept;

        let mut changes: Vec<_> = dropped.into_iter().map(BindingChange::Unbound).collect();
        changes.extend(self.try_binding(registry));
        changes
    }
}

impl DependencyHandler for AggregateDependency {
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
        self.selector
            .candidates(registry, self.requirement.specification(), None)
            .into_iter()
            .flat_map(|binding| self.add(binding))
            .collect()
    }

    fn on_service_registered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange> {
        match Binding::resolve(registry, reference) {
            Some(binding) => self.add(binding),
            None => Vec::new(),
        }
    }

    fn on_service_unregistered(
        &mut self,
        _registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange> {
        match self.position(reference.id()) {
            Some(index) => vec![BindingChange::Unbound(self.bound.remove(index))],
            None => Vec::new(),
        }
    }

    fn on_service_modified(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
        previous: &Properties,
    ) -> Vec<BindingChange> {
        match self.position(reference.id()) {
            Some(index) => {
                let binding = self.bound[index].clone();
                sort_bindings(&mut self.bound);
                vec![BindingChange::Updated {
                    binding,
                    previous: previous.clone(),
                }]
            }
            None => self.on_service_registered(registry, reference),
        }
    }

    fn is_satisfied(&self) -> bool {
        self.requirement.is_optional() || !self.bound.is_empty()
    }

    fn value(&self) -> Injected {
        if self.bound.is_empty() {
            Injected::None
        } else {
            Injected::Services(self.bound.iter().map(|b| b.service.clone()).collect())
        }
    }

    fn bindings(&self) -> Vec<Binding> {
        self.bound.clone()
    }

    fn clear(&mut self) -> Vec<BindingChange> {
        self.bound.drain(..).map(BindingChange::Unbound).collect()
    }
}
