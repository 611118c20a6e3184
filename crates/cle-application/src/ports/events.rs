//! Lifecycle Event Ports
//!
//! Listeners observe lifecycle events; a dispatcher decides on which thread
//! they are delivered.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use cle_domain::events::LifecycleEvent;
use tracing::error;

/// Observer of lifecycle events.
///
/// Listeners called inline run while the instance concerned is locked; they
/// may query the engine but should keep work short.
pub trait LifecycleListener: Send + Sync {
    fn lifecycle_event(&self, event: &LifecycleEvent);
}

impl<F> LifecycleListener for F
where
    F: Fn(&LifecycleEvent) + Send + Sync,
{
    fn lifecycle_event(&self, event: &LifecycleEvent) {
        self(event);
    }
}

/// One event and the listeners registered when it was published
pub struct EventDelivery {
    event: LifecycleEvent,
    listeners: Vec<Arc<dyn LifecycleListener>>,
}

impl EventDelivery {
    pub(crate) fn new(event: LifecycleEvent, listeners: Vec<Arc<dyn LifecycleListener>>) -> Self {
        Self { event, listeners }
    }

    pub fn event(&self) -> &LifecycleEvent {
        &self.event
    }

    /// Call every listener; a panicking listener does not stop the others
    pub fn deliver(self) {
        for listener in &self.listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.lifecycle_event(&self.event)));
            if outcome.is_err() {
                error!(
                    kind = %self.event.kind,
                    factory = %self.event.factory,
                    instance = ?self.event.instance,
                    "Lifecycle listener panicked"
                );
            }
        }
    }
}

/// Strategy delivering lifecycle events to listeners
pub trait EventDispatcher: Send + Sync {
    /// Deliver one event; deliveries must keep their publication order
    fn dispatch(&self, delivery: EventDelivery);

    /// Block until every event dispatched so far was delivered
    fn flush(&self) {}
}
