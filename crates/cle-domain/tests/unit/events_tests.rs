//! Unit tests for lifecycle events

use cle_domain::events::{LifecycleEvent, LifecycleEventKind};

#[test]
fn test_factory_event_has_no_instance() {
    let event = LifecycleEvent::for_factory(LifecycleEventKind::Registered, "http");
    assert_eq!(event.factory, "http");
    assert!(event.instance.is_none());
    assert!(event.service_id.is_none());
}

#[test]
fn test_kind_serializes_upper_case() {
    let json = serde_json::to_string(&LifecycleEventKind::Invalidated).unwrap();
    assert_eq!(json, "\"INVALIDATED\"");
    for kind in LifecycleEventKind::ALL {
        assert_eq!(
            serde_json::to_string(&kind).unwrap(),
            format!("\"{}\"", kind.as_str())
        );
    }
}

#[test]
fn test_event_serialization() {
    let event = LifecycleEvent::for_instance(LifecycleEventKind::Unbound, "f", "i")
        .with_binding("sink", 3);
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["kind"], "UNBOUND");
    assert_eq!(value["instance"], "i");
    assert_eq!(value["field"], "sink");
    assert_eq!(value["service_id"], 3);
}
