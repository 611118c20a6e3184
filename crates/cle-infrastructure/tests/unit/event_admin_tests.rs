//! Event admin tests

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cle_application::registry::ServiceRegistry;
use cle_domain::constants::{EVENT_HANDLER_SPECIFICATION, EVENT_TOPIC, EVENT_TOPICS};
use cle_domain::error::{CallbackError, CallbackResult, Error};
use cle_domain::events::{LifecycleEvent, LifecycleEventKind};
use cle_domain::value_objects::{Properties, ServiceObject, properties};
use cle_infrastructure::config::EventAdminConfig;
use cle_infrastructure::constants::EVENT_TIMESTAMP;
use cle_infrastructure::events::{
    EventAdmin, EventHandler, lifecycle_properties, lifecycle_topic, register_handler,
    validate_topic,
};
use crossbeam_channel::{Receiver, bounded};
use parking_lot::Mutex;
use serde_json::Value;

const WAIT: Duration = Duration::from_secs(5);

/// Records (handler label, topic, properties, thread)
#[derive(Default)]
struct Journal {
    entries: Mutex<Vec<(String, String, Properties, String)>>,
}

impl Journal {
    fn labels(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.0.clone()).collect()
    }

    fn topics(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.1.clone()).collect()
    }
}

struct Handler {
    label: String,
    journal: Arc<Journal>,
    fail: bool,
}

impl EventHandler for Handler {
    fn handle_event(&self, topic: &str, properties: &Properties) -> CallbackResult {
        let thread = thread::current().name().unwrap_or("unnamed").to_string();
        self.journal.entries.lock().push((
            self.label.clone(),
            topic.to_string(),
            properties.clone(),
            thread,
        ));
        if self.fail {
            return Err(CallbackError::failed(format!("{} refused", self.label)));
        }
        Ok(())
    }
}

fn handler(label: &str, journal: &Arc<Journal>) -> Arc<dyn EventHandler> {
    Arc::new(Handler {
        label: label.to_string(),
        journal: Arc::clone(journal),
        fail: false,
    })
}

fn failing(label: &str, journal: &Arc<Journal>) -> Arc<dyn EventHandler> {
    Arc::new(Handler {
        label: label.to_string(),
        journal: Arc::clone(journal),
        fail: true,
    })
}

fn admin(registry: &Arc<ServiceRegistry>, muffle_errors: bool) -> EventAdmin {
    let config = EventAdminConfig {
        muffle_errors,
        ..EventAdminConfig::default()
    };
    EventAdmin::start(Arc::clone(registry), &config).unwrap()
}

#[test]
fn test_topic_validation() {
    assert!(validate_topic("cle/component/BOUND").is_ok());
    assert!(validate_topic("single").is_ok());
    for bad in ["", "/leading", "trailing/", "a//b", "a/*", "a/b?"] {
        assert!(
            matches!(validate_topic(bad), Err(Error::Value { .. })),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn test_send_reaches_matching_topics_only() {
    let registry = Arc::new(ServiceRegistry::new());
    let admin = admin(&registry, true);
    let journal = Arc::new(Journal::default());
    register_handler(&registry, handler("orders", &journal), &["shop/orders/*"], None);
    register_handler(&registry, handler("all-shop", &journal), &["shop/*"], None);
    register_handler(&registry, handler("stock", &journal), &["stock/*"], None);

    let delivered = admin
        .send("shop/orders/created", properties([("id", Value::from(7))]))
        .unwrap();
    assert_eq!(delivered, 2);
    assert_eq!(journal.labels(), vec!["orders", "all-shop"]);

    let entries = journal.entries.lock();
    let props = &entries[0].2;
    assert_eq!(props.get(EVENT_TOPIC), Some(&Value::from("shop/orders/created")));
    assert_eq!(props.get("id"), Some(&Value::from(7)));
    assert!(props.get(EVENT_TIMESTAMP).is_some_and(Value::is_i64));
}

#[test]
fn test_single_string_topic_property() {
    let registry = Arc::new(ServiceRegistry::new());
    let admin = admin(&registry, true);
    let journal = Arc::new(Journal::default());
    registry.register(
        EVENT_HANDLER_SPECIFICATION,
        ServiceObject::new::<dyn EventHandler>(handler("exact", &journal)),
        properties([(EVENT_TOPICS, Value::from("alarm/fire"))]),
    );

    assert_eq!(admin.send("alarm/fire", Properties::new()).unwrap(), 1);
    assert_eq!(admin.send("alarm/flood", Properties::new()).unwrap(), 0);
}

#[test]
fn test_event_filter() {
    let registry = Arc::new(ServiceRegistry::new());
    let admin = admin(&registry, true);
    let journal = Arc::new(Journal::default());
    register_handler(
        &registry,
        handler("severe", &journal),
        &["log/*"],
        Some("(level>=3)"),
    );

    assert_eq!(
        admin
            .send("log/entry", properties([("level", Value::from(1))]))
            .unwrap(),
        0
    );
    assert_eq!(
        admin
            .send("log/entry", properties([("level", Value::from(4))]))
            .unwrap(),
        1
    );
}

#[test]
fn test_handlers_called_by_ranking() {
    let registry = Arc::new(ServiceRegistry::new());
    let admin = admin(&registry, true);
    let journal = Arc::new(Journal::default());
    for (label, ranking) in [("low", -1), ("high", 10), ("mid", 0)] {
        registry.register(
            EVENT_HANDLER_SPECIFICATION,
            ServiceObject::new::<dyn EventHandler>(handler(label, &journal)),
            properties([
                (EVENT_TOPICS, Value::from(vec!["t"])),
                ("service.ranking", Value::from(ranking)),
            ]),
        );
    }

    admin.send("t", Properties::new()).unwrap();
    assert_eq!(journal.labels(), vec!["high", "mid", "low"]);
}

#[test]
fn test_unmuffled_send_stops_at_first_failure() {
    let registry = Arc::new(ServiceRegistry::new());
    let admin = admin(&registry, false);
    let journal = Arc::new(Journal::default());
    register_handler(&registry, failing("broken", &journal), &["t"], None);
    register_handler(&registry, handler("after", &journal), &["t"], None);

    let result = admin.send("t", Properties::new());
    assert!(matches!(result, Err(Error::Infrastructure { source: Some(_), .. })));
    assert_eq!(journal.labels(), vec!["broken"]);
}

#[test]
fn test_muffled_send_continues_after_failure() {
    let registry = Arc::new(ServiceRegistry::new());
    let admin = admin(&registry, true);
    let journal = Arc::new(Journal::default());
    register_handler(&registry, failing("broken", &journal), &["t"], None);
    register_handler(&registry, handler("after", &journal), &["t"], None);
    let panicking: Arc<dyn EventHandler> =
        Arc::new(|_: &str, _: &Properties| -> CallbackResult { panic!("handler bug") });
    register_handler(&registry, panicking, &["t"], None);

    assert_eq!(admin.send("t", Properties::new()).unwrap(), 1);
    assert_eq!(journal.labels(), vec!["broken", "after"]);
}

#[test]
fn test_topic_change_is_picked_up() {
    let registry = Arc::new(ServiceRegistry::new());
    let admin = admin(&registry, true);
    let journal = Arc::new(Journal::default());
    let registration = register_handler(&registry, handler("mover", &journal), &["a/*"], None);

    assert_eq!(admin.send("b/x", Properties::new()).unwrap(), 0);
    registry
        .update_properties(
            &registration,
            properties([(EVENT_TOPICS, Value::from(vec!["b/*"]))]),
        )
        .unwrap();
    assert_eq!(admin.send("b/x", Properties::new()).unwrap(), 1);

    registry.unregister(&registration);
    assert_eq!(admin.send("b/x", Properties::new()).unwrap(), 0);
}

#[test]
fn test_topic_changes_racing_deliveries_leave_no_stale_matcher() {
    let registry = Arc::new(ServiceRegistry::new());
    let admin = Arc::new(admin(&registry, true));
    let journal = Arc::new(Journal::default());
    let registration = register_handler(&registry, handler("mover", &journal), &["a/*"], None);

    let sender = {
        let admin = Arc::clone(&admin);
        thread::spawn(move || {
            for _ in 0..2_000 {
                let _ = admin.send("a/x", Properties::new());
                let _ = admin.send("b/x", Properties::new());
            }
        })
    };
    for round in 0..500 {
        let topic = if round % 2 == 0 { "b/*" } else { "a/*" };
        registry
            .update_properties(
                &registration,
                properties([(EVENT_TOPICS, Value::from(vec![topic]))]),
            )
            .unwrap();
    }
    sender.join().unwrap();

    // last update selected "a/*"
    assert_eq!(admin.send("a/x", Properties::new()).unwrap(), 1);
    assert_eq!(admin.send("b/x", Properties::new()).unwrap(), 0);
}

#[test]
fn test_malformed_handler_is_skipped() {
    let registry = Arc::new(ServiceRegistry::new());
    let admin = admin(&registry, false);
    let journal = Arc::new(Journal::default());
    register_handler(&registry, handler("bad-glob", &journal), &["a/[b"], None);
    register_handler(&registry, handler("bad-filter", &journal), &["a/*"], Some("(x="));
    register_handler(&registry, handler("fine", &journal), &["a/*"], None);
    // not an EventHandler at all
    registry.register(
        EVENT_HANDLER_SPECIFICATION,
        ServiceObject::from_value(3_u8),
        properties([(EVENT_TOPICS, Value::from("a/*"))]),
    );

    assert_eq!(admin.send("a/b", Properties::new()).unwrap(), 1);
    assert_eq!(journal.labels(), vec!["fine"]);
}

#[test]
fn test_post_is_delivered_by_workers() {
    let registry = Arc::new(ServiceRegistry::new());
    let admin = admin(&registry, true);
    let journal = Arc::new(Journal::default());
    register_handler(&registry, handler("async", &journal), &["jobs/*"], None);

    for i in 0..10 {
        admin
            .post("jobs/done", properties([("n", Value::from(i))]))
            .unwrap();
    }
    assert!(admin.wait_idle(WAIT));

    let entries = journal.entries.lock();
    assert_eq!(entries.len(), 10);
    assert!(entries.iter().all(|e| e.3.starts_with("cle-event-")));
}

/// Blocks the single worker until released
struct Gate {
    started: crossbeam_channel::Sender<()>,
    release: Receiver<()>,
}

impl EventHandler for Gate {
    fn handle_event(&self, _topic: &str, _properties: &Properties) -> CallbackResult {
        let _ = self.started.try_send(());
        let _ = self.release.recv_timeout(Duration::from_secs(10));
        Ok(())
    }
}

#[test]
fn test_post_reports_full_queue() {
    let registry = Arc::new(ServiceRegistry::new());
    let config = EventAdminConfig {
        workers: 1,
        queue_capacity: 1,
        ..EventAdminConfig::default()
    };
    let admin = EventAdmin::start(Arc::clone(&registry), &config).unwrap();
    let (started_tx, started) = bounded(1);
    let (release, release_rx) = bounded(4);
    register_handler(
        &registry,
        Arc::new(Gate {
            started: started_tx,
            release: release_rx,
        }),
        &["slow"],
        None,
    );

    admin.post("slow", Properties::new()).unwrap();
    started.recv_timeout(WAIT).unwrap();
    admin.post("slow", Properties::new()).unwrap();
    assert_eq!(admin.queued(), 1);
    assert!(matches!(
        admin.post("slow", Properties::new()),
        Err(Error::Capacity { .. })
    ));
    assert!(matches!(
        admin.post("bad//topic", Properties::new()),
        Err(Error::Value { .. })
    ));

    release.send(()).unwrap();
    release.send(()).unwrap();
    assert!(admin.wait_idle(WAIT));
}

#[test]
fn test_shutdown_delivers_posted_events() {
    let registry = Arc::new(ServiceRegistry::new());
    let admin = admin(&registry, true);
    let journal = Arc::new(Journal::default());
    register_handler(&registry, handler("late", &journal), &["t"], None);

    for _ in 0..5 {
        admin.post("t", Properties::new()).unwrap();
    }
    admin.shutdown();
    assert_eq!(journal.topics().len(), 5);
    assert!(admin.post("t", Properties::new()).is_err());
}

#[test]
fn test_lifecycle_topics_and_properties() {
    assert_eq!(
        lifecycle_topic(LifecycleEventKind::Validated),
        "cle/component/VALIDATED"
    );

    let event = LifecycleEvent::for_instance(LifecycleEventKind::Bound, "logger-factory", "logger")
        .with_binding("sink", 7);
    let props = lifecycle_properties(&event);
    assert_eq!(props.get("kind"), Some(&Value::from("BOUND")));
    assert_eq!(props.get("factory"), Some(&Value::from("logger-factory")));
    assert_eq!(props.get("instance"), Some(&Value::from("logger")));
    assert_eq!(props.get("service_id"), Some(&Value::from(7)));
    assert_eq!(props.get("field"), Some(&Value::from("sink")));
    assert_eq!(
        props.get(EVENT_TIMESTAMP),
        Some(&Value::from(event.timestamp.timestamp_millis()))
    );

    let factory_event = LifecycleEvent::for_factory(LifecycleEventKind::Registered, "f");
    let props = lifecycle_properties(&factory_event);
    assert!(!props.contains_key("instance"));
    assert!(!props.contains_key("service_id"));
}
