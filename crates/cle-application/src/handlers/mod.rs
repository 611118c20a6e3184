//! Dependency Handlers
//!
//! One handler per dependency field of an instance. Handlers only run under
//! the lock of their instance, fed by its mailbox in registry order. They
//! never call component code themselves: they report [`BindingChange`]s that
//! the instance turns into callbacks and lifecycle events.
//!
//! | Handler | Dependency kind |
//! |---------|-----------------|
//! | [`SimpleDependency`] | single service, optional or mandatory |
//! | [`AggregateDependency`] | every matching service |
//! | [`BestDependency`] | highest-ranked service, rebinding on better offers |
//! | [`BroadcastDependency`] | proxy forwarding calls to every match |
//! | [`MapDependency`] | matches keyed by a property value |
//! | [`VarFilterDependency`] | filter rendered from instance properties |
//! | [`TemporalDependency`] | single service tolerating a bounded gap |

mod aggregate;
mod best;
mod broadcast;
mod map;
mod simple;
mod temporal;
mod var_filter;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cle_domain::filter::Filter;
use cle_domain::value_objects::{
    BindingDetails, DependencyDetails, DependencyKind, Properties, Requirement, ServiceObject,
};

use crate::matcher;
use crate::registry::{ServiceReference, ServiceRegistry};

pub use aggregate::AggregateDependency;
pub use best::BestDependency;
pub use broadcast::{BroadcastDependency, BroadcastProxy};
pub use map::MapDependency;
pub use simple::SimpleDependency;
pub use temporal::{TemporalDependency, TemporalProxy};
pub use var_filter::{VarFilterDependency, render_template};

/// Called with a generation number when a temporal gap expires
pub type ExpiryNotifier = Arc<dyn Fn(u64) + Send + Sync>;

// ============================================================================
// Bindings
// ============================================================================

/// A service bound to a dependency
#[derive(Clone)]
pub struct Binding {
    pub reference: ServiceReference,
    pub service: ServiceObject,
}

impl Binding {
    /// Bind a reference if its service is still registered
    pub fn resolve(registry: &ServiceRegistry, reference: &ServiceReference) -> Option<Self> {
        registry.get_service(reference).map(|service| Self {
            reference: reference.clone(),
            service,
        })
    }

    pub fn id(&self) -> u64 {
        self.reference.id()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Binding").field(&self.reference.id()).finish()
    }
}

/// Change of the bindings of one dependency
#[derive(Debug, Clone)]
pub enum BindingChange {
    /// A service was added
    Bound(Binding),
    /// A service was removed
    Unbound(Binding),
    /// A bound service changed its properties
    Updated {
        binding: Binding,
        previous: Properties,
    },
    /// A bound service was replaced by another one
    Rebound {
        old: Binding,
        new: Binding,
        /// Swap without invalidating the instance
        immediate: bool,
    },
}

/// Value injected into a dependency field
#[derive(Clone, Default)]
pub enum Injected {
    /// Nothing bound
    #[default]
    None,
    /// Single binding
    Service(ServiceObject),
    /// Aggregate binding, in lookup order
    Services(Vec<ServiceObject>),
    /// Keyed binding, one service per key
    Map(BTreeMap<Option<String>, ServiceObject>),
    /// Keyed aggregate binding
    MultiMap(BTreeMap<Option<String>, Vec<ServiceObject>>),
    /// Broadcast proxy
    Broadcast(BroadcastProxy),
    /// Temporal proxy
    Temporal(TemporalProxy),
}

impl Injected {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// The single service, recovered as `T`
    pub fn service<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self {
            Self::Service(service) => service.downcast::<T>(),
            _ => None,
        }
    }

    /// Every service of an aggregate binding that is a `T`
    pub fn services<T>(&self) -> Vec<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self {
            Self::Services(services) => services.iter().filter_map(|s| s.downcast::<T>()).collect(),
            Self::Service(service) => service.downcast::<T>().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Keys of a map binding
    pub fn keys(&self) -> Vec<Option<String>> {
        match self {
            Self::Map(map) => map.keys().cloned().collect(),
            Self::MultiMap(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for Injected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Service(_) => f.write_str("Service"),
            Self::Services(s) => write!(f, "Services({})", s.len()),
            Self::Map(m) => f.debug_tuple("Map").field(&m.keys().collect::<Vec<_>>()).finish(),
            Self::MultiMap(m) => f
                .debug_tuple("MultiMap")
                .field(&m.keys().collect::<Vec<_>>())
                .finish(),
            Self::Broadcast(p) => write!(f, "Broadcast({})", p.len()),
            Self::Temporal(_) => f.write_str("Temporal"),
        }
    }
}

// ============================================================================
// Handler Contract
// ============================================================================

/// Tracks the bindings of one dependency field
pub trait DependencyHandler: Send {
    fn field(&self) -> &str;

    fn requirement(&self) -> &Requirement;

    fn kind(&self) -> &DependencyKind;

    /// Filter services must pass right now
    fn current_filter(&self) -> Option<&Filter> {
        self.requirement().filter()
    }

    /// Filter given to the registry listener of this handler
    fn listener_filter(&self) -> Option<Filter> {
        self.requirement().filter().cloned()
    }

    /// Whether a service with these properties is a candidate
    fn accepts(&self, specification: &str, properties: &Properties) -> bool {
        matcher::matches_snapshot(
            self.requirement().specification(),
            self.current_filter(),
            specification,
            properties,
        )
    }

    /// Bind the services already registered
    fn try_binding(&mut self, registry: &ServiceRegistry) -> Vec<BindingChange>;

    /// A candidate service appeared
    fn on_service_registered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange>;

    /// A service went away or stopped being a candidate
    fn on_service_unregistered(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
    ) -> Vec<BindingChange>;

    /// The properties of a candidate changed
    fn on_service_modified(
        &mut self,
        registry: &ServiceRegistry,
        reference: &ServiceReference,
        previous: &Properties,
    ) -> Vec<BindingChange>;

    /// Instance properties changed
    fn on_properties_changed(
        &mut self,
        _registry: &ServiceRegistry,
        _properties: &Properties,
    ) -> Vec<BindingChange> {
        Vec::new()
    }

    /// A gap opened by a temporal dependency expired
    fn on_timeout(&mut self, _generation: u64) -> Vec<BindingChange> {
        Vec::new()
    }

    fn is_satisfied(&self) -> bool;

    /// Value to inject into the field
    fn value(&self) -> Injected;

    /// Current bindings, in lookup order
    fn bindings(&self) -> Vec<Binding>;

    /// Map key of a binding, for keyed dependencies
    fn binding_key(&self, _binding: &Binding) -> Option<String> {
        None
    }

    /// Release every binding
    fn clear(&mut self) -> Vec<BindingChange>;

    /// Administrative snapshot
    fn details(&self) -> DependencyDetails {
        let requirement = self.requirement();
        DependencyDetails {
            field: self.field().to_string(),
            specification: requirement.specification().to_string(),
            filter: self.current_filter().map(ToString::to_string),
            kind: self.kind().name().to_string(),
            optional: requirement.is_optional(),
            aggregate: requirement.is_aggregate(),
            satisfied: self.is_satisfied(),
            bindings: self
                .bindings()
                .iter()
                .map(|b| BindingDetails {
                    service_id: b.id(),
                    specification: b.reference.specification().to_string(),
                    key: self.binding_key(b),
                })
                .collect(),
        }
    }
}

/// Build the handler for one dependency field
pub(crate) fn create_handler(
    field: &str,
    requirement: &Requirement,
    kind: &DependencyKind,
    properties: &Properties,
    default_timeout: Duration,
    on_expiry: ExpiryNotifier,
) -> Box<dyn DependencyHandler> {
    let field = field.to_string();
    let requirement = requirement.clone();
    match kind {
        DependencyKind::Simple if requirement.is_aggregate() => {
            Box::new(AggregateDependency::new(field, requirement))
        }
        DependencyKind::Simple => Box::new(SimpleDependency::new(field, requirement)),
        DependencyKind::Best => Box::new(BestDependency::new(field, requirement)),
        DependencyKind::Broadcast { muffle_errors } => {
            Box::new(BroadcastDependency::new(field, requirement, *muffle_errors))
        }
        DependencyKind::Map { key, allow_none } => Box::new(MapDependency::new(
            field,
            requirement,
            key.clone(),
            *allow_none,
        )),
        DependencyKind::VarFilter { template } => Box::new(VarFilterDependency::new(
            field,
            requirement,
            template.clone(),
            properties,
        )),
        DependencyKind::Temporal { timeout } => {
            let timeout = if timeout.is_zero() {
                default_timeout
            } else {
                *timeout
            };
            Box::new(TemporalDependency::new(field, requirement, timeout, on_expiry))
        }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Candidate services that are still registered, in lookup order
pub(crate) fn candidates(
    registry: &ServiceRegistry,
    specification: &str,
    filter: Option<&Filter>,
    excluded: Option<u64>,
) -> Vec<Binding> {
    registry
        .find_with(Some(specification), filter)
        .iter()
        .filter(|r| Some(r.id()) != excluded)
        .filter_map(|r| Binding::resolve(registry, r))
        .collect()
}

/// Best candidate other than `excluded`
pub(crate) fn best_candidate(
    registry: &ServiceRegistry,
    specification: &str,
    filter: Option<&Filter>,
    excluded: Option<u64>,
) -> Option<Binding> {
    registry
        .find_with(Some(specification), filter)
        .iter()
        .filter(|r| Some(r.id()) != excluded)
        .find_map(|r| Binding::resolve(registry, r))
}

/// Keep bindings in lookup order
pub(crate) fn sort_bindings(bindings: &mut [Binding]) {
    bindings.sort_by_cached_key(|b| b.reference.sort_key());
}

/// Filter currently applied by a handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Selector {
    filter: Option<Filter>,
    /// Matches nothing, e.g. after a failed filter rendering
    blocked: bool,
}

impl Selector {
    pub(crate) fn new(filter: Option<Filter>) -> Self {
        Self {
            filter,
            blocked: false,
        }
    }

    pub(crate) fn blocked() -> Self {
        Self {
            filter: None,
            blocked: true,
        }
    }

    pub(crate) fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub(crate) fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub(crate) fn accepts(&self, wanted: &str, specification: &str, properties: &Properties) -> bool {
        !self.blocked && matcher::matches_snapshot(wanted, self.filter(), specification, properties)
    }

    pub(crate) fn accepts_reference(&self, wanted: &str, reference: &ServiceReference) -> bool {
        !self.blocked && matcher::matches_with(wanted, self.filter(), reference)
    }

    pub(crate) fn candidates(
        &self,
        registry: &ServiceRegistry,
        specification: &str,
        excluded: Option<u64>,
    ) -> Vec<Binding> {
        if self.blocked {
            Vec::new()
        } else {
            candidates(registry, specification, self.filter(), excluded)
        }
    }

    pub(crate) fn best(
        &self,
        registry: &ServiceRegistry,
        specification: &str,
        excluded: Option<u64>,
    ) -> Option<Binding> {
        if self.blocked {
            None
        } else {
            best_candidate(registry, specification, self.filter(), excluded)
        }
    }
}

/// Handlers whose filter can change after creation
pub(crate) trait Refilter: DependencyHandler {
    fn set_selector(&mut self, selector: Selector);

    /// Drop bindings the new filter rejects and bind new matches
    fn reevaluate(&mut self, registry: &ServiceRegistry) -> Vec<BindingChange>;
}
