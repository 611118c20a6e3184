//! Tests for the dependency kinds, driven through the engine
//!
//! Simple, aggregate, broadcast, variable-filter and temporal dependencies.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cle_application::Engine;
use cle_application::handlers::Injected;
use cle_application::ports::{COMPONENT_FACTORIES, ComponentFactoryEntry, list_linked_factories};
use cle_application::component::ComponentBuilder;
use cle_domain::value_objects::{ComponentState, Properties, Requirement, properties};
use cle_domain::{CallbackError, Error, LifecycleEventKind};
use parking_lot::Mutex;
use serde_json::Value;

use crate::test_utils::{EventLog, Greeter, Idle, Witness, greet_all, greeter, witnessed_factory};

fn state(engine: &Engine, name: &str) -> ComponentState {
    engine.get_instance_details(name).unwrap().state
}

/// Poll until `condition` holds or two seconds went by
fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn lang_greeter(engine: &Engine, name: &str, lang: &str) -> cle_application::ServiceRegistration {
    engine.registry().register(
        "greeter",
        greeter(name),
        properties([("lang", Value::from(lang))]),
    )
}

// ============================================================================
// Simple
// ============================================================================

#[test]
fn test_optional_dependency_validates_without_service() {
    let engine = Engine::new();
    let witness = Arc::new(Witness::default());
    engine
        .register_factory(
            "a",
            witnessed_factory("f", &witness)
                .requires_with("g", Requirement::new("greeter").optional())
                .build()
                .unwrap(),
        )
        .unwrap();
    assert_eq!(engine.instantiate("f", "x", Properties::new()).unwrap(), ComponentState::Valid);
    assert!(witness.injected("g").is_none());

    let reg = lang_greeter(&engine, "hi", "en");
    assert_eq!(
        witness.injected("g").service::<dyn Greeter>().unwrap().greet(),
        "hi"
    );
    engine.registry().unregister(&reg);
    assert!(witness.injected("g").is_none());
    assert_eq!(state(&engine, "x"), ComponentState::Valid);
}

#[test]
fn test_simple_dependency_rebinds_to_replacement() {
    let engine = Engine::new();
    let log = EventLog::attach(&engine);
    let witness = Arc::new(Witness::default());
    engine
        .register_factory("a", witnessed_factory("f", &witness).requires("g", "greeter").build().unwrap())
        .unwrap();
    let first = lang_greeter(&engine, "first", "en");
    let second = lang_greeter(&engine, "second", "en");
    engine.instantiate("f", "x", Properties::new()).unwrap();
    log.clear();

    engine.registry().unregister(&first);
    assert_eq!(state(&engine, "x"), ComponentState::Valid);
    assert_eq!(
        witness.injected("g").service::<dyn Greeter>().unwrap().greet(),
        "second"
    );
    // not immediate: the instance goes through invalidation
    assert_eq!(
        log.kinds_for("x"),
        vec![
            LifecycleEventKind::Invalidated,
            LifecycleEventKind::Unbound,
            LifecycleEventKind::Bound,
            LifecycleEventKind::Validated,
        ]
    );
    assert_eq!(
        log.bindings_for("x"),
        vec![
            (LifecycleEventKind::Unbound, first.id()),
            (LifecycleEventKind::Bound, second.id()),
        ]
    );
}

#[test]
fn test_filter_change_unbinds_service() {
    let engine = Engine::new();
    let witness = Arc::new(Witness::default());
    engine
        .register_factory(
            "a",
            witnessed_factory("f", &witness)
                .requires_with("g", Requirement::new("greeter").with_filter("(lang=fr)").unwrap())
                .build()
                .unwrap(),
        )
        .unwrap();
    let reg = lang_greeter(&engine, "salut", "fr");
    engine.instantiate("f", "x", Properties::new()).unwrap();
    assert_eq!(state(&engine, "x"), ComponentState::Valid);

    engine
        .registry()
        .update_properties(&reg, properties([("lang", Value::from("en"))]))
        .unwrap();
    assert_eq!(state(&engine, "x"), ComponentState::Invalid);

    engine
        .registry()
        .update_properties(&reg, properties([("lang", Value::from("fr"))]))
        .unwrap();
    assert_eq!(state(&engine, "x"), ComponentState::Valid);
}

#[test]
fn test_bound_service_update_calls_update() {
    let engine = Engine::new();
    let witness = Arc::new(Witness::default());
    engine
        .register_factory("a", witnessed_factory("f", &witness).requires("g", "greeter").build().unwrap())
        .unwrap();
    let reg = lang_greeter(&engine, "hi", "en");
    engine.instantiate("f", "x", Properties::new()).unwrap();
    engine
        .registry()
        .update_properties(&reg, properties([("lang", Value::from("de"))]))
        .unwrap();
    assert!(witness.calls().contains(&format!("update:g:{}", reg.id())));
}

// ============================================================================
// Broadcast
// ============================================================================

#[test]
fn test_broadcast_reaches_every_service() {
    let engine = Engine::new();
    let witness = Arc::new(Witness::default());
    engine
        .register_factory(
            "a",
            witnessed_factory("f", &witness)
                .requires_broadcast("all", Requirement::new("greeter").optional())
                .build()
                .unwrap(),
        )
        .unwrap();
    engine.instantiate("f", "x", Properties::new()).unwrap();

    let Injected::Broadcast(proxy) = witness.injected("all") else {
        panic!("expected a broadcast proxy");
    };
    assert!(matches!(proxy.call::<dyn Greeter, _>(|_| Ok(())), Ok(false)));

    lang_greeter(&engine, "one", "en");
    lang_greeter(&engine, "two", "en");
    let heard = Mutex::new(Vec::new());
    let called = proxy.call::<dyn Greeter, _>(|g| {
        heard.lock().push(g.greet());
        Ok(())
    });
    assert!(matches!(called, Ok(true)));
    assert_eq!(*heard.lock(), vec!["one".to_string(), "two".to_string()]);
}

#[test]
fn test_unmuffled_broadcast_stops_at_first_failure() {
    let engine = Engine::new();
    let witness = Arc::new(Witness::default());
    engine
        .register_factory(
            "a",
            witnessed_factory("f", &witness)
                .requires_broadcast_with("all", Requirement::new("greeter"), false)
                .build()
                .unwrap(),
        )
        .unwrap();
    lang_greeter(&engine, "one", "en");
    lang_greeter(&engine, "two", "en");
    engine.instantiate("f", "x", Properties::new()).unwrap();

    let Injected::Broadcast(proxy) = witness.injected("all") else {
        panic!("expected a broadcast proxy");
    };
    let calls = Mutex::new(0);
    let result = proxy.call::<dyn Greeter, _>(|_| {
        *calls.lock() += 1;
        Err(CallbackError::failed("nope"))
    });
    assert!(result.is_err());
    assert_eq!(*calls.lock(), 1);
}

#[test]
fn test_mandatory_broadcast_needs_a_target() {
    let engine = Engine::new();
    engine
        .register_factory(
            "a",
            ComponentBuilder::of::<Idle>("f")
                .requires_broadcast("all", Requirement::new("greeter"))
                .build()
                .unwrap(),
        )
        .unwrap();
    assert_eq!(
        engine.instantiate("f", "x", Properties::new()).unwrap(),
        ComponentState::Instantiated
    );
    lang_greeter(&engine, "one", "en");
    assert_eq!(state(&engine, "x"), ComponentState::Valid);
}

// ============================================================================
// Variable filter
// ============================================================================

#[test]
fn test_var_filter_follows_instance_properties() {
    let engine = Engine::new();
    let witness = Arc::new(Witness::default());
    engine
        .register_factory(
            "a",
            witnessed_factory("f", &witness)
                .requires_var_filter("g", Requirement::new("greeter"), "(lang={lang})")
                .build()
                .unwrap(),
        )
        .unwrap();
    lang_greeter(&engine, "hello", "en");
    lang_greeter(&engine, "bonjour", "fr");

    engine
        .instantiate("f", "x", properties([("lang", Value::from("fr"))]))
        .unwrap();
    let greet = || witness.injected("g").service::<dyn Greeter>().map(|g| g.greet());
    assert_eq!(greet().as_deref(), Some("bonjour"));
    assert_eq!(
        engine.get_instance_details("x").unwrap().dependencies[0].filter.as_deref(),
        Some("(lang=fr)")
    );

    engine
        .update_properties("x", properties([("lang", Value::from("en"))]))
        .unwrap();
    assert_eq!(greet().as_deref(), Some("hello"));
    assert_eq!(state(&engine, "x"), ComponentState::Valid);

    engine
        .update_properties("x", properties([("lang", Value::from("de"))]))
        .unwrap();
    assert_eq!(greet(), None);
    assert_eq!(state(&engine, "x"), ComponentState::Invalid);
}

#[test]
fn test_var_filter_with_missing_property_matches_nothing() {
    let engine = Engine::new();
    engine
        .register_factory(
            "a",
            ComponentBuilder::of::<Idle>("f")
                .requires_var_filter("g", Requirement::new("greeter"), "(lang={lang})")
                .build()
                .unwrap(),
        )
        .unwrap();
    lang_greeter(&engine, "hello", "en");
    assert_eq!(
        engine.instantiate("f", "x", Properties::new()).unwrap(),
        ComponentState::Instantiated
    );
    engine
        .update_properties("x", properties([("lang", Value::from("en"))]))
        .unwrap();
    assert_eq!(state(&engine, "x"), ComponentState::Valid);
}

// ============================================================================
// Temporal
// ============================================================================

#[test]
fn test_temporal_gap_is_bridged_by_replacement() {
    let engine = Engine::new();
    let log = EventLog::attach(&engine);
    let witness = Arc::new(Witness::default());
    engine
        .register_factory(
            "a",
            witnessed_factory("f", &witness)
                .requires_temporal("clock", Requirement::new("greeter"), Duration::from_secs(5))
                .build()
                .unwrap(),
        )
        .unwrap();
    let first = lang_greeter(&engine, "first", "en");
    engine.instantiate("f", "x", Properties::new()).unwrap();
    let Injected::Temporal(proxy) = witness.injected("clock") else {
        panic!("expected a temporal proxy");
    };

    engine.registry().unregister(&first);
    assert!(!proxy.is_available());
    assert_eq!(state(&engine, "x"), ComponentState::Valid);

    let registry = Arc::clone(engine.registry());
    let replacer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        registry.register("greeter", greeter("second"), Properties::new())
    });
    let greeting = proxy.call::<dyn Greeter, _, _>(|g| g.greet()).unwrap();
    let second = replacer.join().unwrap();

    assert_eq!(greeting, "second");
    assert_eq!(state(&engine, "x"), ComponentState::Valid);
    assert!(!log.kinds_for("x").contains(&LifecycleEventKind::Invalidated));
    assert!(log.bindings_for("x").contains(&(LifecycleEventKind::Bound, second.id())));
}

#[test]
fn test_temporal_gap_expires() {
    let engine = Engine::new();
    let witness = Arc::new(Witness::default());
    engine
        .register_factory(
            "a",
            witnessed_factory("f", &witness)
                .requires_temporal("clock", Requirement::new("greeter"), Duration::from_millis(50))
                .build()
                .unwrap(),
        )
        .unwrap();
    let only = lang_greeter(&engine, "only", "en");
    engine.instantiate("f", "x", Properties::new()).unwrap();
    let Injected::Temporal(proxy) = witness.injected("clock") else {
        panic!("expected a temporal proxy");
    };

    engine.registry().unregister(&only);
    let waited = proxy.service::<dyn Greeter>();
    assert!(matches!(waited, Err(Error::TemporalTimeout { .. })));
    assert!(eventually(|| state(&engine, "x") == ComponentState::Invalid));
    assert!(witness.injected("clock").is_none());
}

#[test]
fn test_temporal_zero_timeout_uses_engine_default() {
    let engine = Engine::new();
    let witness = Arc::new(Witness::default());
    engine
        .register_factory(
            "a",
            witnessed_factory("f", &witness)
                .requires_temporal("clock", Requirement::new("greeter"), Duration::ZERO)
                .build()
                .unwrap(),
        )
        .unwrap();
    lang_greeter(&engine, "only", "en");
    engine.instantiate("f", "x", Properties::new()).unwrap();
    let Injected::Temporal(proxy) = witness.injected("clock") else {
        panic!("expected a temporal proxy");
    };
    assert_eq!(proxy.timeout(), engine.options().default_temporal_timeout);
}

// ============================================================================
// Aggregate
// ============================================================================

#[test]
fn test_aggregate_injection_in_lookup_order() {
    let engine = Engine::new();
    let witness = Arc::new(Witness::default());
    engine
        .register_factory(
            "a",
            witnessed_factory("f", &witness)
                .requires_with("all", Requirement::new("greeter").aggregate())
                .build()
                .unwrap(),
        )
        .unwrap();
    engine.instantiate("f", "x", Properties::new()).unwrap();
    engine.registry().register(
        "greeter",
        greeter("low"),
        properties([("service.ranking", Value::from(1))]),
    );
    engine.registry().register(
        "greeter",
        greeter("high"),
        properties([("service.ranking", Value::from(9))]),
    );
    assert_eq!(greet_all(&witness.injected("all")), vec!["high", "low"]);
    assert_eq!(state(&engine, "x"), ComponentState::Valid);
}

// ============================================================================
// Linked factories
// ============================================================================

fn linked_descriptor() -> cle_domain::Result<cle_application::ComponentDescriptor> {
    ComponentBuilder::of::<Idle>("linked-factory")
        .instantiate("linked", Properties::new())
        .build()
}

#[linkme::distributed_slice(COMPONENT_FACTORIES)]
static LINKED_FACTORY: ComponentFactoryEntry = ComponentFactoryEntry {
    name: "linked-factory",
    bundle: "tests",
    description: "Factory submitted at link time",
    build: linked_descriptor,
};

#[test]
fn test_linked_factories_are_registered() {
    assert!(
        list_linked_factories()
            .iter()
            .any(|(name, bundle, _)| *name == "linked-factory" && *bundle == "tests")
    );
    let engine = Engine::new();
    assert!(engine.register_linked_factories() >= 1);
    assert_eq!(state(&engine, "linked"), ComponentState::Valid);
}
