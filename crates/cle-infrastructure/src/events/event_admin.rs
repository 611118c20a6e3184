//! Event Admin
//!
//! Topic based publish/subscribe on top of the service registry. Handlers
//! are ordinary services registered under `cle.event.handler`; their
//! properties say which topics they want (`event.topics`, glob patterns)
//! and optionally which events (`event.filter`, an LDAP filter applied to
//! the event properties).
//!
//! ```text
//!  send(topic) ──▶ matching handlers, on the caller's thread
//!  post(topic) ──▶ worker pool ──▶ matching handlers
//! ```
//!
//! Handlers are called in registry order (ranking, then registration id).

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cle_application::registry::{
    DispatchScope, ListenerId, ServiceEvent, ServiceListener, ServiceReference,
    ServiceRegistration, ServiceRegistry,
};
use cle_domain::constants::{EVENT_FILTER, EVENT_HANDLER_SPECIFICATION, EVENT_TOPIC, EVENT_TOPICS};
use cle_domain::error::{CallbackResult, Error, Result};
use cle_domain::filter::Filter;
use cle_domain::value_objects::{Properties, ServiceId, ServiceObject};
use dashmap::DashMap;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::config::EventAdminConfig;
use crate::constants::{EVENT_TIMESTAMP, EVENT_WORKER_THREAD_PREFIX};
use crate::events::worker_pool::WorkerPool;

/// Receiver of topic events
pub trait EventHandler: Send + Sync {
    /// Handle one event; `properties` include `event.topic`
    fn handle_event(&self, topic: &str, properties: &Properties) -> CallbackResult;
}

impl<F> EventHandler for F
where
    F: Fn(&str, &Properties) -> CallbackResult + Send + Sync,
{
    fn handle_event(&self, topic: &str, properties: &Properties) -> CallbackResult {
        self(topic, properties)
    }
}

/// Register `handler` for the given topic patterns
pub fn register_handler(
    registry: &ServiceRegistry,
    handler: Arc<dyn EventHandler>,
    topics: &[&str],
    filter: Option<&str>,
) -> ServiceRegistration {
    let mut properties = Properties::new();
    properties.insert(
        EVENT_TOPICS.to_string(),
        Value::Array(topics.iter().map(|t| Value::from(*t)).collect()),
    );
    if let Some(filter) = filter {
        properties.insert(EVENT_FILTER.to_string(), Value::from(filter));
    }
    registry.register(
        EVENT_HANDLER_SPECIFICATION,
        ServiceObject::new::<dyn EventHandler>(handler),
        properties,
    )
}

/// Check a topic given to `send` or `post`
pub fn validate_topic(topic: &str) -> Result<()> {
    let malformed = topic.is_empty()
        || topic.split('/').any(str::is_empty)
        || topic.contains(['*', '?', '[', ']', '{', '}']);
    if malformed {
        return Err(Error::value(format!("Invalid event topic '{topic}'")));
    }
    Ok(())
}

/// Compiled `event.topics` and `event.filter` of one handler
struct HandlerMatcher {
    topics: GlobSet,
    filter: Option<Filter>,
}

/// Handler properties a matcher is compiled from
#[derive(PartialEq)]
struct MatcherSource {
    topics: Option<Value>,
    filter: Option<Value>,
}

impl MatcherSource {
    fn read(reference: &ServiceReference) -> Self {
        Self {
            topics: reference.property(EVENT_TOPICS),
            filter: reference.property(EVENT_FILTER),
        }
    }
}

impl HandlerMatcher {
    fn compile(source: &MatcherSource) -> Result<Self> {
        let patterns = match &source.topics {
            Some(Value::String(pattern)) => vec![pattern.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };

        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(false)
                .build()
                .map_err(|e| Error::value(format!("Invalid topic pattern '{pattern}': {e}")))?;
            builder.add(glob);
        }
        let topics = builder
            .build()
            .map_err(|e| Error::value(format!("Invalid topic patterns: {e}")))?;

        let filter = match &source.filter {
            Some(Value::String(text)) => Filter::parse_optional(text)?,
            _ => None,
        };
        Ok(Self { topics, filter })
    }

    fn matches(&self, topic: &str, properties: &Properties) -> bool {
        self.topics.is_match(topic) && self.filter.as_ref().is_none_or(|f| f.matches(properties))
    }
}

/// Compiled matcher with the properties it was built from
struct CachedMatcher {
    source: MatcherSource,
    /// `None` marks properties that do not compile
    matcher: Option<Arc<HandlerMatcher>>,
}

type MatcherCache = DashMap<ServiceId, CachedMatcher>;

/// Drops cached matchers when handler properties change
struct CacheInvalidator(Arc<MatcherCache>);

impl ServiceListener for CacheInvalidator {
    fn service_changed(&self, event: &ServiceEvent, _scope: &DispatchScope<'_>) {
        self.0.remove(&event.reference.id());
    }
}

struct AdminCore {
    registry: Arc<ServiceRegistry>,
    matchers: Arc<MatcherCache>,
    muffle_errors: bool,
}

impl AdminCore {
    /// Matcher for the handler's current properties
    ///
    /// A cached entry is only used while it was built from the same
    /// properties, so an entry stored after a concurrent modification
    /// is never trusted.
    fn matcher(&self, reference: &ServiceReference) -> Option<Arc<HandlerMatcher>> {
        let source = MatcherSource::read(reference);
        if let Some(cached) = self.matchers.get(&reference.id()) {
            if cached.source == source {
                return cached.matcher.clone();
            }
        }
        let compiled = match HandlerMatcher::compile(&source) {
            Ok(matcher) => Some(Arc::new(matcher)),
            Err(e) => {
                warn!(service_id = reference.id(), error = %e, "Ignoring event handler");
                None
            }
        };
        self.matchers.insert(
            reference.id(),
            CachedMatcher {
                source,
                matcher: compiled.clone(),
            },
        );
        // a handler gone meanwhile must not leave an entry behind
        if !reference.is_registered() {
            self.matchers.remove(&reference.id());
        }
        compiled
    }

    fn deliver(&self, topic: &str, mut properties: Properties) -> Result<usize> {
        properties.insert(EVENT_TOPIC.to_string(), Value::from(topic));
        properties
            .entry(EVENT_TIMESTAMP.to_string())
            .or_insert_with(|| Value::from(Utc::now().timestamp_millis()));

        let mut delivered = 0;
        for reference in self
            .registry
            .find_with(Some(EVENT_HANDLER_SPECIFICATION), None)
        {
            let Some(matcher) = self.matcher(&reference) else {
                continue;
            };
            if !matcher.matches(topic, &properties) {
                continue;
            }
            let Some(handler) = self
                .registry
                .get_service(&reference)
                .and_then(|service| service.downcast::<dyn EventHandler>())
            else {
                debug!(service_id = reference.id(), "Event handler service is not an EventHandler");
                continue;
            };

            trace!(service_id = reference.id(), topic, "Delivering event");
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle_event(topic, &properties)));
            let failure = match outcome {
                Ok(Ok(())) => {
                    delivered += 1;
                    continue;
                }
                Ok(Err(e)) => Error::infrastructure_with_source(
                    format!("Event handler {} failed on '{topic}'", reference.id()),
                    e,
                ),
                Err(_) => Error::infrastructure(format!(
                    "Event handler {} panicked on '{topic}'",
                    reference.id()
                )),
            };
            if !self.muffle_errors {
                return Err(failure);
            }
            warn!(service_id = reference.id(), topic, error = %failure, "Event handler failed");
        }
        Ok(delivered)
    }
}

/// Topic event bus
pub struct EventAdmin {
    core: Arc<AdminCore>,
    pool: WorkerPool,
    listener: ListenerId,
    shutdown_timeout: Duration,
}

impl EventAdmin {
    /// Start the worker pool and watch handler registrations
    pub fn start(registry: Arc<ServiceRegistry>, config: &EventAdminConfig) -> Result<Self> {
        let pool = WorkerPool::new(
            EVENT_WORKER_THREAD_PREFIX,
            config.workers,
            config.queue_capacity,
        )?;
        let matchers = Arc::new(MatcherCache::new());
        let listener = registry.add_service_listener(
            Arc::new(CacheInvalidator(Arc::clone(&matchers))),
            Some(EVENT_HANDLER_SPECIFICATION),
            None,
        );
        Ok(Self {
            core: Arc::new(AdminCore {
                registry,
                matchers,
                muffle_errors: config.muffle_errors,
            }),
            pool,
            listener,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Deliver an event synchronously; returns how many handlers accepted it.
    ///
    /// Unless errors are muffled, delivery stops at the first failing
    /// handler and its error is returned.
    pub fn send(&self, topic: &str, properties: Properties) -> Result<usize> {
        validate_topic(topic)?;
        self.core.deliver(topic, properties)
    }

    /// Queue an event for delivery by a worker.
    ///
    /// Fails with [`Error::Capacity`] when the queue is full. Handler
    /// failures of posted events are logged.
    pub fn post(&self, topic: &str, properties: Properties) -> Result<()> {
        validate_topic(topic)?;
        let core = Arc::clone(&self.core);
        let topic = topic.to_string();
        self.pool.try_enqueue(move || {
            if let Err(e) = core.deliver(&topic, properties) {
                error!(topic = %topic, error = %e, "Posted event delivery failed");
            }
        })?;
        Ok(())
    }

    /// Wait until every posted event was delivered; `false` on timeout
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pool.wait_idle(timeout)
    }

    /// Posted events waiting for a worker
    pub fn queued(&self) -> usize {
        self.pool.queued()
    }

    /// Deliver what was posted, then stop the workers
    pub fn shutdown(&self) {
        self.pool.shutdown(self.shutdown_timeout);
        self.core.registry.remove_service_listener(self.listener);
        self.core.matchers.clear();
    }
}

impl Drop for EventAdmin {
    fn drop(&mut self) {
        self.shutdown();
    }
}
