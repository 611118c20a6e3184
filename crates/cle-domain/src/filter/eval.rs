//! Typed comparison of filter literals against property values

use std::cmp::Ordering;

use serde_json::Value;

use super::Operator;

pub(super) fn matches(operator: &Operator, value: &Value) -> bool {
    if *operator == Operator::Present {
        return true;
    }
    if let Value::Array(items) = value {
        return items.iter().any(|item| matches(operator, item));
    }
    match operator {
        Operator::Present => true,
        Operator::Equal(literal) => compare(value, literal) == Some(Ordering::Equal),
        Operator::GreaterEq(literal) => {
            matches!(compare(value, literal), Some(Ordering::Greater | Ordering::Equal))
        }
        Operator::LessEq(literal) => {
            matches!(compare(value, literal), Some(Ordering::Less | Ordering::Equal))
        }
        Operator::Approx(literal) => {
            text_of(value).is_some_and(|text| normalize(&text) == normalize(literal))
        }
        Operator::Substring(parts) => text_of(value).is_some_and(|text| substring(&text, parts)),
    }
}

/// Compare a property value with a literal converted to the value's type
fn compare(value: &Value, literal: &str) -> Option<Ordering> {
    match value {
        Value::String(s) => Some(s.as_str().cmp(literal)),
        Value::Bool(b) => parse_bool(literal).map(|other| b.cmp(&other)),
        Value::Number(n) => {
            let literal = literal.trim();
            if let Some(i) = n.as_i64() {
                if let Ok(other) = literal.parse::<i64>() {
                    return Some(i.cmp(&other));
                }
            } else if let Some(u) = n.as_u64() {
                if let Ok(other) = literal.parse::<u64>() {
                    return Some(u.cmp(&other));
                }
            }
            let other = literal.parse::<f64>().ok()?;
            n.as_f64()?.partial_cmp(&other)
        }
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn parse_bool(literal: &str) -> Option<bool> {
    let literal = literal.trim();
    if literal.eq_ignore_ascii_case("true") {
        Some(true)
    } else if literal.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// `parts` are the pieces around each wildcard: first is a prefix, last a suffix
fn substring(text: &str, parts: &[String]) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return true;
    };
    let Some(mut remaining) = text.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}
