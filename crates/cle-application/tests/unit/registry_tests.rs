//! Tests for the service registry
//!
//! Ordering, listener notifications, idempotent unregistration and the
//! property round-trip.

use std::sync::Arc;

use cle_application::registry::{
    DispatchScope, ServiceEvent, ServiceEventKind, ServiceListener, ServiceRegistry,
};
use cle_domain::filter::Filter;
use cle_domain::value_objects::{Properties, ServiceObject, properties};
use cle_domain::{Error, OBJECTCLASS, SERVICE_ID};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::Value;

use crate::test_utils::{Greeter, greeter, register_ranked};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(ServiceEventKind, u64)>>,
}

impl ServiceListener for Recorder {
    fn service_changed(&self, event: &ServiceEvent, _scope: &DispatchScope<'_>) {
        self.events.lock().push((event.kind, event.reference.id()));
    }
}

fn listen(registry: &ServiceRegistry, filter: Option<&str>) -> Arc<Recorder> {
    let recorder = Arc::new(Recorder::default());
    let filter = filter.map(|f| Filter::parse(f).unwrap());
    registry.add_service_listener(
        Arc::clone(&recorder) as Arc<dyn ServiceListener>,
        Some("greeter"),
        filter,
    );
    recorder
}

#[test]
fn test_find_orders_by_ranking_then_id() {
    let registry = ServiceRegistry::new();
    let low = register_ranked(&registry, "low", -5);
    let first = register_ranked(&registry, "first", 10);
    let second = register_ranked(&registry, "second", 10);
    let zero = register_ranked(&registry, "zero", 0);

    let ids: Vec<u64> = registry
        .find(Some("greeter"), None)
        .unwrap()
        .iter()
        .map(|r| r.id())
        .collect();
    assert_eq!(ids, vec![first.id(), second.id(), zero.id(), low.id()]);
}

#[test]
fn test_find_rejects_malformed_filter() {
    let registry = ServiceRegistry::new();
    let result = registry.find(Some("greeter"), Some("(name=a"));
    assert!(matches!(result, Err(Error::InvalidFilter { .. })));
}

#[test]
fn test_blank_filter_means_no_filter() {
    let registry = ServiceRegistry::new();
    register_ranked(&registry, "a", 0);
    assert_eq!(registry.find(Some("greeter"), Some("   ")).unwrap().len(), 1);
}

#[test]
fn test_find_without_specification_spans_all_services() {
    let registry = ServiceRegistry::new();
    register_ranked(&registry, "a", 0);
    registry.register("clock", ServiceObject::from_value(1_u64), Properties::new());
    assert_eq!(registry.find(None, None).unwrap().len(), 2);
    assert_eq!(registry.find(None, Some("(objectClass=clock)")).unwrap().len(), 1);
}

#[test]
fn test_reserved_keys_added_on_register() {
    let registry = ServiceRegistry::new();
    let reg = register_ranked(&registry, "a", 3);
    let props = reg.reference().properties();
    assert_eq!(props.get(SERVICE_ID), Some(&Value::from(reg.id())));
    assert_eq!(props.get(OBJECTCLASS), Some(&Value::from("greeter")));
    assert_eq!(reg.reference().ranking(), 3);
}

#[test]
fn test_property_round_trip() {
    let registry = ServiceRegistry::new();
    let reg = register_ranked(&registry, "a", 0);
    let updated = properties([("name", Value::from("b")), ("lang", Value::from("fr"))]);
    registry.update_properties(&reg, updated.clone()).unwrap();

    let found = registry.find(Some("greeter"), None).unwrap();
    let mut props = found[0].properties();
    props.remove(SERVICE_ID);
    props.remove(OBJECTCLASS);
    assert_eq!(props, updated);
}

#[test]
fn test_update_cannot_change_reserved_keys() {
    let registry = ServiceRegistry::new();
    let reg = register_ranked(&registry, "a", 0);
    registry
        .update_properties(
            &reg,
            properties([(SERVICE_ID, Value::from(999)), (OBJECTCLASS, Value::from("other"))]),
        )
        .unwrap();
    assert_eq!(reg.reference().property(SERVICE_ID), Some(Value::from(reg.id())));
    assert_eq!(reg.reference().specification(), "greeter");
}

#[test]
fn test_unregister_is_idempotent() {
    let registry = ServiceRegistry::new();
    let recorder = listen(&registry, None);
    let reg = register_ranked(&registry, "a", 0);

    assert!(registry.unregister(&reg));
    assert!(!registry.unregister(&reg));
    assert!(registry.is_empty());
    assert!(!reg.reference().is_registered());
    assert!(registry.get_service(reg.reference()).is_none());
    assert_eq!(
        *recorder.events.lock(),
        vec![
            (ServiceEventKind::Registered, reg.id()),
            (ServiceEventKind::Unregistering, reg.id()),
        ]
    );
}

#[test]
fn test_update_of_unregistered_service_fails() {
    let registry = ServiceRegistry::new();
    let reg = register_ranked(&registry, "a", 0);
    registry.unregister(&reg);
    let result = registry.update_properties(&reg, Properties::new());
    assert!(matches!(result, Err(Error::NotFound { .. })));
}

#[test]
fn test_modified_end_match_when_filter_stops_matching() {
    let registry = ServiceRegistry::new();
    let recorder = listen(&registry, Some("(lang=fr)"));
    let reg = registry.register(
        "greeter",
        greeter("a"),
        properties([("lang", Value::from("fr"))]),
    );
    registry
        .update_properties(&reg, properties([("lang", Value::from("fr")), ("x", Value::from(1))]))
        .unwrap();
    registry
        .update_properties(&reg, properties([("lang", Value::from("en"))]))
        .unwrap();
    // no longer matching on either side: silent
    registry
        .update_properties(&reg, properties([("lang", Value::from("de"))]))
        .unwrap();
    registry
        .update_properties(&reg, properties([("lang", Value::from("fr"))]))
        .unwrap();

    assert_eq!(
        *recorder.events.lock(),
        vec![
            (ServiceEventKind::Registered, reg.id()),
            (ServiceEventKind::Modified, reg.id()),
            (ServiceEventKind::ModifiedEndMatch, reg.id()),
            (ServiceEventKind::Modified, reg.id()),
        ]
    );
}

#[test]
fn test_service_still_resolvable_while_unregistering() {
    struct Lookup {
        registry: Arc<ServiceRegistry>,
        seen: Mutex<Vec<bool>>,
    }
    impl ServiceListener for Lookup {
        fn service_changed(&self, event: &ServiceEvent, _scope: &DispatchScope<'_>) {
            if event.kind == ServiceEventKind::Unregistering {
                self.seen
                    .lock()
                    .push(self.registry.get_service(&event.reference).is_some());
            }
        }
    }

    let registry = Arc::new(ServiceRegistry::new());
    let lookup = Arc::new(Lookup {
        registry: Arc::clone(&registry),
        seen: Mutex::new(Vec::new()),
    });
    registry.add_service_listener(Arc::clone(&lookup) as Arc<dyn ServiceListener>, None, None);
    let reg = register_ranked(&registry, "a", 0);
    registry.unregister(&reg);
    assert_eq!(*lookup.seen.lock(), vec![true]);
}

#[test]
fn test_removed_listener_is_silent() {
    let registry = ServiceRegistry::new();
    let recorder = Arc::new(Recorder::default());
    let id = registry.add_service_listener(Arc::clone(&recorder) as Arc<dyn ServiceListener>, None, None);
    assert!(registry.remove_service_listener(id));
    assert!(!registry.remove_service_listener(id));
    register_ranked(&registry, "a", 0);
    assert!(recorder.events.lock().is_empty());
}

#[test]
fn test_deferred_tasks_run_after_dispatch() {
    struct Reentrant {
        registry: Arc<ServiceRegistry>,
        order: Arc<Mutex<Vec<String>>>,
    }
    impl ServiceListener for Reentrant {
        fn service_changed(&self, event: &ServiceEvent, scope: &DispatchScope<'_>) {
            if event.reference.specification() != "greeter" {
                return;
            }
            self.order.lock().push("listener".to_string());
            let registry = Arc::clone(&self.registry);
            let order = Arc::clone(&self.order);
            scope.defer(move || {
                order.lock().push("deferred".to_string());
                registry.register("echo", ServiceObject::from_value(()), Properties::new());
            });
        }
    }

    let registry = Arc::new(ServiceRegistry::new());
    let order = Arc::new(Mutex::new(Vec::new()));
    registry.add_service_listener(
        Arc::new(Reentrant {
            registry: Arc::clone(&registry),
            order: Arc::clone(&order),
        }),
        None,
        None,
    );
    register_ranked(&registry, "a", 0);
    assert_eq!(*order.lock(), vec!["listener".to_string(), "deferred".to_string()]);
    assert_eq!(registry.find(Some("echo"), None).unwrap().len(), 1);
}

#[test]
fn test_service_object_recovers_capability() {
    let registry = ServiceRegistry::new();
    let reg = register_ranked(&registry, "hello", 0);
    let service = registry.get_service(reg.reference()).unwrap();
    assert_eq!(service.downcast::<dyn Greeter>().unwrap().greet(), "hello");
}

proptest! {
    #[test]
    fn prop_find_is_sorted_by_ranking_then_id(rankings in proptest::collection::vec(-20_i64..20, 1..24)) {
        let registry = ServiceRegistry::new();
        for (i, ranking) in rankings.iter().enumerate() {
            register_ranked(&registry, &format!("s{i}"), *ranking);
        }
        let found = registry.find(Some("greeter"), None).unwrap();
        prop_assert_eq!(found.len(), rankings.len());
        for pair in found.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.ranking() > b.ranking() || (a.ranking() == b.ranking() && a.id() < b.id()));
        }
    }
}
