//! Keyed dependency

use std::collections::BTreeMap;

use cle_domain::value_objects::{DependencyKind, Properties, Requirement, property_key};

use super::{Binding, BindingChange, DependencyHandler, Injected, Selector};
use crate::registry::{ServiceReference, ServiceRegistry};

type Key = Option<String>;

/// Indexes matching services by the value of one of their properties.
///
/// Services lacking the key property (or holding `null`) are stored under
/// the `None` key when `allow_none` is set and ignored otherwise. A
/// non-aggregate map keeps the first service seen for each key.
pub struct MapDependency {
    field: String,
    requirement: Requirement,
    kind: DependencyKind,
    selector: Selector,
    key: String,
    allow_none: bool,
    entries: Vec<(Key, Binding)>,
}

impl MapDependency {
    pub fn new(field: String, requirement: Requirement, key: String, allow_none: bool) -> Self {
        let selector = Selector::new(requirement.filter().cloned());
        Self {
            field,
            requirement,
            kind: DependencyKind::Map {
                key: key.clone(),
                allow_none,
            },
            selector,
            key,
            allow_none,
            entries: Vec::new(),
        }
    }

    /// Key of a service, `None` when the service cannot be stored
    fn key_of(&self, properties: &Properties) -> Option<Key> {
        match properties.get(&self.key).and_then(property_key) {
            Some(key) => Some(Some(key)),
            None if self.allow_none => Some(None),
            None => None,
        }
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.entries.iter().position(|(_, b)| b.id() == id)
    }

    fn occupied(&self, key: &Key) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    fn store(&mut self, key: Key, binding: Binding) {
        self.entries.push((key, binding));
        self.entries
            .sort_by_cached_key(|(_, b)| b.reference.sort_key());
    }

    fn add(&mut self, registry: &ServiceRegistry, reference: &ServiceReference) -> Vec<BindingChange> {
        if self.position(reference.id()).is_some() {
            return Vec::new();
        }
        let Some(key) = self.key_of(&reference.properties()) else {
            return Vec::new();
        };
        if !self.requirement.is_aggregate() && self.occupied(&key) {
            return Vec::new();
        }
        match Binding::resolve(registry, reference) {
            Some(binding) => {
                self.store(key, binding.clone());
                vec![BindingChange::Bound(binding)]
            }
            None => Vec::new(),
        }
    }

    /// Remove a binding, filling its key again for non-aggregate maps
    fn remove(&mut self, registry: &ServiceRegistry, index: usize) -> Vec<BindingChange> {
        let (key, old) = self.entries.remove(index);
        if !self.requirement.is_aggregate() {
            let replacement = self
                .selector
                .candidates(registry, self.requirement.specification(), Some(old.id()))
                .into_iter()
                .find(|b| {
                    self.position(b.id()).is_none()
                        && self.key_of(&b.reference.properties()).as_ref() == Some(&key)
                });
            if let Some(new) = replacement {
                self.store(key, new.clone());
                return vec![BindingChange::Rebound {
                    old,
                    new,
                    immediate: true,
                }];
            }
        }
        vec![BindingChange::Unbound(old)]
    }
}

impl DependencyHandler for MapDependency {
    fn field(&self) -> &str {
        &self.field
    }

    fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    fn kind(&self) -> &DependencyKind {
        &self.kind
    }

    fn accepts(&self, specification: &str, properties: &Properties) -> bool {
        self.selector
            .accepts(self.requirement.specification(), specification, properties)
            && self.key_of(properties).is_some()
    }

    fn try_binding(&mut self, registry: &ServiceRegistry) -> Vec<BindingChange> {
        let found = self
            .selector
            .candidates(registry, self.requirement.specification(), None);
        found
            .iter()
            .flat_map(|b| self.add(registry, &b.reference))
            .collect()
    }

    fn on_service_registered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange> {
        self.add(registry, reference)
    }

    fn on_service_unregistered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange> {
        match self.position(reference.id()) {
            Some(index) => self.remove(registry, index),
            None => Vec::new(),
        }
    }

    fn on_service_modified(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
        previous: &Properties,
    ) -> Vec<BindingChange> {
        let Some(index) = self.position(reference.id()) else {
            return self.add(registry, reference);
        };
        let current_key = self.key_of(&reference.properties());
        if current_key.as_ref() == Some(&self.entries[index].0) {
            let binding = self.entries[index].1.clone();
            self.entries
                .sort_by_cached_key(|(_, b)| b.reference.sort_key());
            return vec![BindingChange::Updated {
                binding,
                previous: previous.clone(),
            }];
        }

        // key changed: move the service to its new slot
        let mut changes = self.remove(registry, index);
        changes.extend(self.add(registry, reference));
        changes
    }

    /// Services stored under the `None` key alone do not satisfy the map
    fn is_satisfied(&self) -> bool {
        self.requirement.is_optional() || self.entries.iter().any(|(key, _)| key.is_some())
    }

    fn value(&self) -> Injected {
        if self.entries.is_empty() {
            return Injected::None;
        }
        if self.requirement.is_aggregate() {
            let mut map: BTreeMap<Key, Vec<_>> = BTreeMap::new();
            for (key, binding) in &self.entries {
                map.entry(key.clone()).or_default().push(binding.service.clone());
            }
            Injected::MultiMap(map)
        } else {
            Injected::Map(
                self.entries
                    .iter()
                    .map(|(key, binding)| (key.clone(), binding.service.clone()))
                    .collect(),
            )
        }
    }

    fn bindings(&self) -> Vec<Binding> {
        self.entries.iter().map(|(_, b)| b.clone()).collect()
    }

    fn binding_key(&self, binding: &Binding) -> Option<String> {
        self.entries
            .iter()
            .find(|(_, b)| b.id() == binding.id())
            .and_then(|(key, _)| key.clone())
    }

    fn clear(&mut self) -> Vec<BindingChange> {
        self.entries
            .drain(..)
            .map(|(_, b)| BindingChange::Unbound(b))
            .collect()
    }
}
