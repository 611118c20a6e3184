//! Unit tests for LDAP filter parsing and evaluation

use cle_domain::filter::{Filter, escape};
use cle_domain::value_objects::{Properties, properties};
use proptest::prelude::*;
use serde_json::json;

fn props(value: serde_json::Value) -> Properties {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_nested_boolean_filter() {
    let filter = Filter::parse("(&(objectClass=logger)(|(level=debug)(level=trace))(!(muted=true)))")
        .unwrap();

    assert!(filter.matches(&props(json!({"objectClass": "logger", "level": "trace"}))));
    assert!(!filter.matches(&props(json!({"objectClass": "logger", "level": "info"}))));
    assert!(!filter.matches(&props(json!({
        "objectClass": "logger", "level": "debug", "muted": true
    }))));
}

#[test]
fn test_presence() {
    let filter = Filter::parse("(endpoint=*)").unwrap();
    assert!(filter.matches(&props(json!({"endpoint": ""}))));
    assert!(filter.matches(&props(json!({"endpoint": []}))));
    assert!(!filter.matches(&props(json!({"other": 1}))));
}

#[test]
fn test_parse_optional() {
    assert!(Filter::parse_optional("").unwrap().is_none());
    assert!(Filter::parse_optional("  \n").unwrap().is_none());
    assert!(Filter::parse_optional("(a=1)").unwrap().is_some());
    assert!(Filter::parse_optional("(a=1").is_err());
}

#[test]
fn test_serde_uses_text_form() {
    let filter = Filter::parse("(&(a=1)(b>=2))").unwrap();
    let text = serde_json::to_string(&filter).unwrap();
    assert_eq!(text, "\"(&(a=1)(b>=2))\"");
    let back: Filter = serde_json::from_str(&text).unwrap();
    assert_eq!(back, filter);
    assert!(serde_json::from_str::<Filter>("\"(a=\"").is_err());
}

proptest! {
    #[test]
    fn escaped_values_match_themselves(value in "[ -~]{0,24}") {
        let filter = Filter::parse(&format!("(name={})", escape(&value))).unwrap();
        let props = properties([("name", json!(value.trim()))]);
        prop_assert!(filter.matches(&props));
    }
}
