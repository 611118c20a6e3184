//! Queued lifecycle dispatcher tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use cle_application::component::ComponentBuilder;
use cle_application::dispatch::EventHub;
use cle_application::ports::{Component, EventDispatcher, LifecycleListener};
use cle_application::{Engine, EngineOptions};
use cle_domain::error::Error;
use cle_domain::events::{LifecycleEvent, LifecycleEventKind};
use cle_domain::value_objects::Properties;
use cle_infrastructure::constants::DISPATCHER_THREAD_NAME;
use cle_infrastructure::events::QueuedEventDispatcher;
use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;

/// Records (factory, delivering thread) pairs
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(String, String)>>,
}

impl LifecycleListener for Recorder {
    fn lifecycle_event(&self, event: &LifecycleEvent) {
        let thread = thread::current().name().unwrap_or("unnamed").to_string();
        self.seen.lock().push((event.factory.clone(), thread));
    }
}

fn factory_event(name: &str) -> LifecycleEvent {
    LifecycleEvent::for_factory(LifecycleEventKind::Registered, name)
}

#[test]
fn test_zero_capacity_is_rejected() {
    assert!(matches!(
        QueuedEventDispatcher::start(0),
        Err(Error::Configuration { .. })
    ));
}

#[test]
fn test_events_delivered_in_order_on_dispatcher_thread() {
    let dispatcher = Arc::new(QueuedEventDispatcher::start(256).unwrap());
    let hub = EventHub::new(Arc::clone(&dispatcher) as Arc<dyn EventDispatcher>);
    let recorder = Arc::new(Recorder::default());
    hub.add_listener(Arc::clone(&recorder) as Arc<dyn LifecycleListener>);

    for i in 0..100 {
        hub.publish(factory_event(&format!("f{i}")));
    }
    hub.flush();

    let seen = recorder.seen.lock();
    let names: Vec<_> = seen.iter().map(|(name, _)| name.clone()).collect();
    let expected: Vec<_> = (0..100).map(|i| format!("f{i}")).collect();
    assert_eq!(names, expected);
    assert!(seen.iter().all(|(_, thread)| thread == DISPATCHER_THREAD_NAME));
}

/// Blocks the dispatcher thread on the first event until released
struct Blocker {
    blocked: AtomicBool,
    started: Sender<()>,
    release: Receiver<()>,
    inner: Recorder,
}

impl LifecycleListener for Blocker {
    fn lifecycle_event(&self, event: &LifecycleEvent) {
        self.inner.lifecycle_event(event);
        if !self.blocked.swap(true, Ordering::SeqCst) {
            self.started.send(()).unwrap();
            let _ = self.release.recv_timeout(Duration::from_secs(10));
        }
    }
}

#[test]
fn test_full_queue_delivers_inline() {
    let dispatcher = Arc::new(QueuedEventDispatcher::start(1).unwrap());
    let hub = EventHub::new(Arc::clone(&dispatcher) as Arc<dyn EventDispatcher>);
    let (started_tx, started) = bounded(1);
    let (release, release_rx) = bounded(1);
    let blocker = Arc::new(Blocker {
        blocked: AtomicBool::new(false),
        started: started_tx,
        release: release_rx,
        inner: Recorder::default(),
    });
    hub.add_listener(Arc::clone(&blocker) as Arc<dyn LifecycleListener>);

    hub.publish(factory_event("first"));
    started.recv_timeout(Duration::from_secs(5)).unwrap();
    hub.publish(factory_event("queued"));
    assert_eq!(dispatcher.pending(), 1);
    hub.publish(factory_event("overflow"));

    release.send(()).unwrap();
    hub.flush();

    let seen = blocker.inner.seen.lock().clone();
    let current = thread::current().name().unwrap_or("unnamed").to_string();
    assert_eq!(
        seen,
        vec![
            ("first".to_string(), DISPATCHER_THREAD_NAME.to_string()),
            ("overflow".to_string(), current),
            ("queued".to_string(), DISPATCHER_THREAD_NAME.to_string()),
        ]
    );
}

/// Flushes the dispatcher that is delivering to it
struct Flusher {
    dispatcher: Weak<QueuedEventDispatcher>,
    calls: Mutex<usize>,
}

impl LifecycleListener for Flusher {
    fn lifecycle_event(&self, _event: &LifecycleEvent) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.flush();
        }
        *self.calls.lock() += 1;
    }
}

#[test]
fn test_flush_from_listener_returns() {
    let dispatcher = Arc::new(QueuedEventDispatcher::start(8).unwrap());
    let hub = EventHub::new(Arc::clone(&dispatcher) as Arc<dyn EventDispatcher>);
    let flusher = Arc::new(Flusher {
        dispatcher: Arc::downgrade(&dispatcher),
        calls: Mutex::new(0),
    });
    hub.add_listener(Arc::clone(&flusher) as Arc<dyn LifecycleListener>);

    hub.publish(factory_event("a"));
    hub.publish(factory_event("b"));
    hub.flush();
    assert_eq!(*flusher.calls.lock(), 2);
}

#[test]
fn test_after_shutdown_delivery_is_inline() {
    let dispatcher = Arc::new(QueuedEventDispatcher::start(8).unwrap());
    let hub = EventHub::new(Arc::clone(&dispatcher) as Arc<dyn EventDispatcher>);
    let recorder = Arc::new(Recorder::default());
    hub.add_listener(Arc::clone(&recorder) as Arc<dyn LifecycleListener>);

    hub.publish(factory_event("before"));
    dispatcher.shutdown();
    dispatcher.shutdown();
    hub.publish(factory_event("after"));
    hub.flush();

    let seen = recorder.seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].1, DISPATCHER_THREAD_NAME);
    assert_ne!(seen[1].1, DISPATCHER_THREAD_NAME);
}

#[derive(Default)]
struct Quiet;

impl Component for Quiet {}

#[derive(Default)]
struct Kinds(Mutex<Vec<LifecycleEventKind>>);

impl LifecycleListener for Kinds {
    fn lifecycle_event(&self, event: &LifecycleEvent) {
        self.0.lock().push(event.kind);
    }
}

#[test]
fn test_engine_events_through_queued_dispatcher() {
    let dispatcher = Arc::new(QueuedEventDispatcher::start(64).unwrap());
    let engine = Engine::with_dispatcher(
        Arc::clone(&dispatcher) as Arc<dyn EventDispatcher>,
        EngineOptions::default(),
    );
    let kinds = Arc::new(Kinds::default());
    engine.add_listener(Arc::clone(&kinds) as Arc<dyn LifecycleListener>);

    engine
        .register_factory(
            "tests",
            ComponentBuilder::of::<Quiet>("quiet-factory").build().unwrap(),
        )
        .unwrap();
    engine
        .instantiate("quiet-factory", "quiet", Properties::new())
        .unwrap();
    engine.kill("quiet").unwrap();
    engine.flush_events();

    assert_eq!(
        *kinds.0.lock(),
        vec![
            LifecycleEventKind::Registered,
            LifecycleEventKind::Instantiated,
            LifecycleEventKind::Validated,
            LifecycleEventKind::Invalidated,
            LifecycleEventKind::Killed,
        ]
    );
}
