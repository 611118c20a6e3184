//! Property bags
//!
//! Services and component instances both carry an ordered map of JSON values.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::constants::SERVICE_RANKING;

/// Ordered property bag
pub type Properties = BTreeMap<String, Value>;

/// Build a property bag from key/value pairs
///
/// # Example
///
/// ```
/// use cle_domain::value_objects::properties;
///
/// let props = properties([("service.ranking", 10.into()), ("lang", "fr".into())]);
/// assert_eq!(props.len(), 2);
/// ```
pub fn properties<I, K>(entries: I) -> Properties
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Ranking carried by a property bag; missing or non-integer values count as 0
pub fn ranking_of(properties: &Properties) -> i64 {
    properties
        .get(SERVICE_RANKING)
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

/// Render a property value as a map key.
///
/// Strings are used as-is, `null` gives no key and every other value is
/// rendered as JSON text.
pub fn property_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
