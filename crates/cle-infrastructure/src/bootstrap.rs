//! Engine Bootstrap
//!
//! Composition root: turns an [`AppConfig`] into a running [`Engine`] with
//! its lifecycle dispatcher, event admin and lifecycle bridge.
//!
//! ```text
//! AppConfig ──▶ dispatcher (inline | queued) ──▶ Engine ──▶ linked factories
//!                                                  │
//!                               registry ◀─────────┤
//!                                  │               ▼ lifecycle events
//!                             EventAdmin ◀──── LifecycleBridge
//! ```
//!
//! ## Usage
//!
//! ```
//! use cle_infrastructure::bootstrap::build_engine;
//! use cle_infrastructure::config::AppConfig;
//!
//! let context = build_engine(&AppConfig::default()).unwrap();
//! assert!(context.engine().is_running());
//! context.shutdown();
//! assert!(!context.engine().is_running());
//! ```

use std::sync::Arc;

use cle_application::ports::EventDispatcher;
use cle_application::registry::ServiceRegistration;
use cle_application::{Engine, InlineEventDispatcher, LifecycleListenerId};
use cle_domain::error::Result;
use cle_domain::value_objects::{Properties, ServiceObject};
use parking_lot::Mutex;
use tracing::info;

use crate::config::{AppConfig, DispatchMode, validate_app_config};
use crate::constants::EVENT_ADMIN_SPECIFICATION;
use crate::events::{EventAdmin, LifecycleBridge, QueuedEventDispatcher};

/// Event admin wiring kept for shutdown
struct EventAdminParts {
    admin: Arc<EventAdmin>,
    registration: ServiceRegistration,
    bridge: LifecycleListenerId,
}

/// Engine and the infrastructure built around it
pub struct EngineContext {
    /// Configuration the context was built from
    pub config: Arc<AppConfig>,
    engine: Engine,
    dispatcher: Option<Arc<QueuedEventDispatcher>>,
    event_admin: Mutex<Option<EventAdminParts>>,
}

impl EngineContext {
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Event admin, when enabled and not shut down
    pub fn event_admin(&self) -> Option<Arc<EventAdmin>> {
        self.event_admin
            .lock()
            .as_ref()
            .map(|parts| Arc::clone(&parts.admin))
    }

    /// Stop the engine, then the event admin, then the lifecycle dispatcher.
    ///
    /// Lifecycle events of the shutdown itself are still republished.
    pub fn shutdown(&self) {
        self.engine.shutdown();
        if let Some(parts) = self.event_admin.lock().take() {
            self.engine.remove_listener(parts.bridge);
            self.engine.registry().unregister(&parts.registration);
            parts.admin.shutdown();
        }
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.shutdown();
        }
        info!(uid = %self.engine.uid(), "Engine context stopped");
    }
}

/// Build an engine from configuration
///
/// The event admin, when enabled, registers itself in the engine registry
/// under `cle.event.admin` so that components can depend on it.
pub fn build_engine(config: &AppConfig) -> Result<EngineContext> {
    validate_app_config(config)?;

    let (dispatcher, queued): (Arc<dyn EventDispatcher>, _) = match config.engine.dispatch {
        DispatchMode::Inline => (Arc::new(InlineEventDispatcher), None),
        DispatchMode::Queued => {
            let queued = Arc::new(QueuedEventDispatcher::start(
                config.engine.dispatch_queue_capacity,
            )?);
            (Arc::clone(&queued) as Arc<dyn EventDispatcher>, Some(queued))
        }
    };
    let engine = Engine::with_dispatcher(dispatcher, config.engine.options());

    let event_admin = if config.event_admin.enabled {
        let admin = Arc::new(EventAdmin::start(
            Arc::clone(engine.registry()),
            &config.event_admin,
        )?);
        let registration = engine.registry().register(
            EVENT_ADMIN_SPECIFICATION,
            ServiceObject::new(Arc::clone(&admin)),
            Properties::new(),
        );
        let bridge = engine.add_listener(Arc::new(LifecycleBridge::new(Arc::clone(&admin))));
        Some(EventAdminParts {
            admin,
            registration,
            bridge,
        })
    } else {
        None
    };

    let linked = if config.engine.register_linked_factories {
        engine.register_linked_factories()
    } else {
        0
    };

    info!(
        uid = %engine.uid(),
        dispatch = ?config.engine.dispatch,
        event_admin = config.event_admin.enabled,
        linked_factories = linked,
        "Engine context ready"
    );

    Ok(EngineContext {
        config: Arc::new(config.clone()),
        engine,
        dispatcher: queued,
        event_admin: Mutex::new(event_admin),
    })
}
