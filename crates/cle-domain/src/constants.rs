//! Domain layer constants
//!
//! Property keys that carry a meaning for the engine. Every key not listed
//! here belongs to whoever registered the service or created the instance.

// ============================================================================
// REGISTRY RESERVED KEYS
// ============================================================================

/// Registration id, set by the registry (integer)
pub const SERVICE_ID: &str = "service.id";

/// Specification name, set by the registry (string)
pub const OBJECTCLASS: &str = "objectClass";

/// Ranking used to order lookups (integer, default 0)
pub const SERVICE_RANKING: &str = "service.ranking";

// ============================================================================
// PROVIDED SERVICE KEYS
// ============================================================================

/// Name of the instance that provides a service
pub const INSTANCE_NAME: &str = "instance.name";

/// Name of the factory of the instance that provides a service
pub const FACTORY_NAME: &str = "factory.name";

// ============================================================================
// EVENT ADMIN KEYS
// ============================================================================

/// Specification under which topic event handlers register
pub const EVENT_HANDLER_SPECIFICATION: &str = "cle.event.handler";

/// Handler property: topic glob patterns (string or array of strings)
pub const EVENT_TOPICS: &str = "event.topics";

/// Handler property: LDAP filter applied to the event properties
pub const EVENT_FILTER: &str = "event.filter";

/// Event property holding the topic the event was sent on
pub const EVENT_TOPIC: &str = "event.topic";

/// Topic prefix used when republishing lifecycle events
pub const LIFECYCLE_TOPIC_PREFIX: &str = "cle/component";
