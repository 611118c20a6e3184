//! Service references and registrations

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use cle_domain::value_objects::{Properties, ServiceId, ServiceObject, ranking_of};
use parking_lot::RwLock;
use serde_json::Value;

struct ReferenceInner {
    id: ServiceId,
    specification: String,
    properties: RwLock<Properties>,
    service: RwLock<Option<ServiceObject>>,
}

/// Handle on a registered service.
///
/// Cheap to clone. Equality and hashing use the registration id. Once the
/// service is unregistered the reference stays readable but no longer
/// yields the service object.
#[derive(Clone)]
pub struct ServiceReference(Arc<ReferenceInner>);

impl ServiceReference {
    pub(crate) fn new(
        id: ServiceId,
        specification: String,
        properties: Properties,
        service: ServiceObject,
    ) -> Self {
        Self(Arc::new(ReferenceInner {
            id,
            specification,
            properties: RwLock::new(properties),
            service: RwLock::new(Some(service)),
        }))
    }

    pub fn id(&self) -> ServiceId {
        self.0.id
    }

    pub fn specification(&self) -> &str {
        &self.0.specification
    }

    /// Copy of the current properties, reserved keys included
    pub fn properties(&self) -> Properties {
        self.0.properties.read().clone()
    }

    pub fn property(&self, key: &str) -> Option<Value> {
        self.0.properties.read().get(key).cloned()
    }

    pub fn ranking(&self) -> i64 {
        ranking_of(&self.0.properties.read())
    }

    pub(crate) fn matches_filter(&self, filter: &cle_domain::filter::Filter) -> bool {
        filter.matches(&self.0.properties.read())
    }

    /// Whether the service is still registered
    pub fn is_registered(&self) -> bool {
        self.0.service.read().is_some()
    }

    /// Lookup order: ranking descending, then id ascending
    pub(crate) fn sort_key(&self) -> (std::cmp::Reverse<i64>, ServiceId) {
        (std::cmp::Reverse(self.ranking()), self.id())
    }

    pub(crate) fn service(&self) -> Option<ServiceObject> {
        self.0.service.read().clone()
    }

    pub(crate) fn replace_properties(&self, properties: Properties) -> Properties {
        std::mem::replace(&mut *self.0.properties.write(), properties)
    }

    pub(crate) fn release(&self) {
        self.0.service.write().take();
    }
}

impl PartialEq for ServiceReference {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for ServiceReference {}

impl Hash for ServiceReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference")
            .field("id", &self.0.id)
            .field("specification", &self.0.specification)
            .field("ranking", &self.ranking())
            .finish()
    }
}

/// Handle returned by [`ServiceRegistry::register`](super::ServiceRegistry::register),
/// used to update or unregister the service
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceRegistration {
    reference: ServiceReference,
}

impl ServiceRegistration {
    pub(crate) fn new(reference: ServiceReference) -> Self {
        Self { reference }
    }

    pub fn id(&self) -> ServiceId {
        self.reference.id()
    }

    pub fn reference(&self) -> &ServiceReference {
        &self.reference
    }
}
