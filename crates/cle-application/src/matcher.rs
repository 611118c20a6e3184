//! Requirement Matcher
//!
//! Decides whether a registered service satisfies a requirement: the
//! specification is compared first, then the optional filter is evaluated
//! over the live properties of the service.

use cle_domain::filter::Filter;
use cle_domain::value_objects::{Properties, Requirement};

use crate::registry::{ServiceReference, ServiceRegistry};

/// Whether `reference` satisfies `requirement`
pub fn matches(requirement: &Requirement, reference: &ServiceReference) -> bool {
    matches_with(requirement.specification(), requirement.filter(), reference)
}

/// Whether `reference` has the given specification and passes `filter`
pub fn matches_with(
    specification: &str,
    filter: Option<&Filter>,
    reference: &ServiceReference,
) -> bool {
    reference.specification() == specification && filter.is_none_or(|f| reference.matches_filter(f))
}

/// Whether a property snapshot of a `specification` service passes `filter`
pub fn matches_snapshot(
    wanted: &str,
    filter: Option<&Filter>,
    specification: &str,
    properties: &Properties,
) -> bool {
    wanted == specification && filter.is_none_or(|f| f.matches(properties))
}

/// Every registered service satisfying the requirement, in lookup order
pub fn find_matches(registry: &ServiceRegistry, requirement: &Requirement) -> Vec<ServiceReference> {
    registry.find_with(Some(requirement.specification()), requirement.filter())
}
