//! Pest-based parser turning filter text into a [`Filter`] tree

use pest::Parser;
use pest::error::InputLocation;
use pest::iterators::Pair;
use pest_derive::Parser;

use super::{Criterion, Filter, Operator};
use crate::error::{Error, Result};

#[derive(Parser)]
#[grammar = "filter/ldap.pest"]
struct LdapParser;

pub(super) fn parse(text: &str) -> Result<Filter> {
    let mut pairs = LdapParser::parse(Rule::filter, text).map_err(|e| {
        let position = match e.location {
            InputLocation::Pos(pos) | InputLocation::Span((pos, _)) => pos,
        };
        Error::invalid_filter(text, format!("{} at offset {position}", e.variant.message()))
    })?;

    let root = pairs
        .next()
        .and_then(|filter| filter.into_inner().next())
        .ok_or_else(|| Error::invalid_filter(text, "empty filter"))?;
    build(root, text)
}

fn build(pair: Pair<'_, Rule>, text: &str) -> Result<Filter> {
    match pair.as_rule() {
        Rule::and => Ok(Filter::And(build_all(pair, text)?)),
        Rule::or => Ok(Filter::Or(build_all(pair, text)?)),
        Rule::not => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| Error::invalid_filter(text, "negation without operand"))?;
            Ok(Filter::Not(Box::new(build(inner, text)?)))
        }
        Rule::item => build_item(pair, text).map(Filter::Item),
        other => Err(Error::invalid_filter(
            text,
            format!("unexpected element {other:?}"),
        )),
    }
}

fn build_all(pair: Pair<'_, Rule>, text: &str) -> Result<Vec<Filter>> {
    pair.into_inner().map(|p| build(p, text)).collect()
}

fn build_item(pair: Pair<'_, Rule>, text: &str) -> Result<Criterion> {
    let mut inner = pair.into_inner();
    let (Some(attribute), Some(operator), Some(value)) = (inner.next(), inner.next(), inner.next())
    else {
        return Err(Error::invalid_filter(text, "incomplete criterion"));
    };

    let attribute = attribute.as_str().trim();
    if attribute.is_empty() {
        return Err(Error::invalid_filter(text, "missing attribute name"));
    }

    let raw = value.as_str().trim();
    let parts = split_wildcards(raw);
    let operator = match operator.as_str() {
        "=" if raw == "*" => Operator::Present,
        "=" if parts.len() > 1 => Operator::Substring(parts),
        op if parts.len() > 1 => {
            return Err(Error::invalid_filter(
                text,
                format!("wildcard not allowed with '{op}'"),
            ));
        }
        "=" => Operator::Equal(take_single(parts)),
        "~=" => Operator::Approx(take_single(parts)),
        ">=" => Operator::GreaterEq(take_single(parts)),
        "<=" => Operator::LessEq(take_single(parts)),
        op => {
            return Err(Error::invalid_filter(
                text,
                format!("unknown operator '{op}'"),
            ));
        }
    };

    Ok(Criterion {
        attribute: attribute.to_string(),
        operator,
    })
}

/// Unescape a raw value, splitting it on unescaped `*`
fn split_wildcards(raw: &str) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let (Some(next), Some(last)) = (chars.next(), parts.last_mut()) {
                    last.push(next);
                }
            }
            '*' => parts.push(String::new()),
            c => {
                if let Some(last) = parts.last_mut() {
                    last.push(c);
                }
            }
        }
    }
    parts
}

fn take_single(mut parts: Vec<String>) -> String {
    parts.pop().unwrap_or_default()
}
