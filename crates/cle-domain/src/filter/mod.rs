//! LDAP Filters
//!
//! Predicates over service properties, written in the LDAP search filter
//! syntax (RFC 1960 style):
//!
//! | Form | Meaning |
//! |------|---------|
//! | `(&(a=1)(b=2))` | conjunction |
//! | `(\|(a=1)(b=2))` | disjunction |
//! | `(!(a=1))` | negation |
//! | `(a=x)`, `(a>=x)`, `(a<=x)` | typed comparison |
//! | `(a~=x)` | approximate: case and whitespace insensitive |
//! | `(a=*)` | presence |
//! | `(a=ab*cd*)` | substring |
//!
//! The characters `(`, `)`, `*` and `\` are escaped with a backslash.
//! A filter made of a single criterion may omit its parentheses.

mod eval;
mod parser;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;
use crate::value_objects::Properties;

/// Parsed LDAP filter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Every sub-filter must match (an empty conjunction matches everything)
    And(Vec<Filter>),
    /// At least one sub-filter must match
    Or(Vec<Filter>),
    /// The sub-filter must not match
    Not(Box<Filter>),
    /// A single attribute test
    Item(Criterion),
}

/// Single attribute test of a filter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Criterion {
    /// Property key, surrounding whitespace removed
    pub attribute: String,
    /// Comparison applied to the property value
    pub operator: Operator,
}

/// Comparison of a criterion, carrying its unescaped literal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `attr=value`
    Equal(String),
    /// `attr~=value`
    Approx(String),
    /// `attr>=value`
    GreaterEq(String),
    /// `attr<=value`
    LessEq(String),
    /// `attr=*`
    Present,
    /// `attr=a*b*c`: the literal pieces around each wildcard
    Substring(Vec<String>),
}

impl Filter {
    /// Parse a filter string.
    ///
    /// Fails with [`Error::InvalidFilter`](crate::Error::InvalidFilter) on
    /// malformed input, including an empty string.
    pub fn parse(text: &str) -> Result<Self> {
        parser::parse(text)
    }

    /// Parse an optional filter: blank text means "no filter"
    pub fn parse_optional(text: &str) -> Result<Option<Self>> {
        if text.trim().is_empty() {
            Ok(None)
        } else {
            parser::parse(text).map(Some)
        }
    }

    /// Conjunction of two filters, flattening nested conjunctions
    pub fn and(self, other: Filter) -> Filter {
        let mut items = match self {
            Filter::And(items) => items,
            filter => vec![filter],
        };
        match other {
            Filter::And(more) => items.extend(more),
            filter => items.push(filter),
        }
        Filter::And(items)
    }

    /// Evaluate the filter against a property bag
    pub fn matches(&self, properties: &Properties) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(properties)),
            Filter::Or(items) => items.iter().any(|f| f.matches(properties)),
            Filter::Not(inner) => !inner.matches(properties),
            Filter::Item(criterion) => criterion.matches(properties),
        }
    }
}

impl Criterion {
    /// Evaluate this criterion; a missing attribute never matches
    pub fn matches(&self, properties: &Properties) -> bool {
        properties
            .get(&self.attribute)
            .is_some_and(|value| eval::matches(&self.operator, value))
    }
}

/// Escape the LDAP special characters of a literal value
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '(' | ')' | '*') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(items) => {
                f.write_str("(&")?;
                for item in items {
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Filter::Or(items) => {
                f.write_str("(|")?;
                for item in items {
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
            Filter::Item(criterion) => write!(f, "{criterion}"),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attr = &self.attribute;
        match &self.operator {
            Operator::Equal(v) => write!(f, "({attr}={})", escape(v)),
            Operator::Approx(v) => write!(f, "({attr}~={})", escape(v)),
            Operator::GreaterEq(v) => write!(f, "({attr}>={})", escape(v)),
            Operator::LessEq(v) => write!(f, "({attr}<={})", escape(v)),
            Operator::Present => write!(f, "({attr}=*)"),
            Operator::Substring(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| escape(p)).collect();
                write!(f, "({attr}={})", rendered.join("*"))
            }
        }
    }
}

impl std::str::FromStr for Filter {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Filter::parse(s)
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Filter::parse(&text).map_err(serde::de::Error::custom)
    }
}
