//! Lifecycle event hub
//!
//! Instances and factories publish [`LifecycleEvent`]s here. The hub takes a
//! snapshot of the current listeners and hands the delivery to its
//! [`EventDispatcher`], which may call them inline or on another thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cle_domain::events::LifecycleEvent;
use parking_lot::RwLock;
use tracing::trace;

use crate::ports::{EventDelivery, EventDispatcher, LifecycleListener};

/// Identifier of a lifecycle listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LifecycleListenerId(u64);

/// Delivers every event on the publishing thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineEventDispatcher;

impl EventDispatcher for InlineEventDispatcher {
    fn dispatch(&self, delivery: EventDelivery) {
        delivery.deliver();
    }
}

/// Listener list shared by the engine and its instances
pub struct EventHub {
    dispatcher: Arc<dyn EventDispatcher>,
    listeners: RwLock<Vec<(LifecycleListenerId, Arc<dyn LifecycleListener>)>>,
    last_id: AtomicU64,
}

impl EventHub {
    pub fn new(dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self {
            dispatcher,
            listeners: RwLock::new(Vec::new()),
            last_id: AtomicU64::new(0),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn LifecycleListener>) -> LifecycleListenerId {
        let id = LifecycleListenerId(self.last_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.listeners.write().push((id, listener));
        id
    }

    /// Returns `false` if the listener was unknown
    pub fn remove_listener(&self, id: LifecycleListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(known, _)| *known != id);
        listeners.len() != before
    }

    pub fn publish(&self, event: LifecycleEvent) {
        trace!(
            kind = %event.kind,
            factory = %event.factory,
            instance = ?event.instance,
            "Lifecycle event"
        );
        let listeners: Vec<_> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        if listeners.is_empty() {
            return;
        }
        self.dispatcher.dispatch(EventDelivery::new(event, listeners));
    }

    /// Wait until every published event was delivered
    pub fn flush(&self) {
        self.dispatcher.flush();
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(Arc::new(InlineEventDispatcher))
    }
}
