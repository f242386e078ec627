// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Reference filter evaluation against a single record

use std::cmp::Ordering;

use super::{Assertion, Filter, SubstringAssertion};
use crate::schema::{AttributeSchema, MatchingRule};
use crate::store::Record;

/// Evaluate `filter` against `record`.
///
/// Undefined results (missing matching rule, values the rule cannot parse)
/// evaluate to false, and a NOT over an undefined result stays false.
pub fn matches(filter: &Filter, record: &Record, schema: &dyn AttributeSchema) -> bool {
    evaluate(filter, record, schema).unwrap_or(false)
}

fn evaluate(filter: &Filter, record: &Record, schema: &dyn AttributeSchema) -> Option<bool> {
    match filter {
        Filter::And(children) => {
            let mut result = Some(true);
            for child in children {
                match evaluate(child, record, schema) {
                    Some(false) => return Some(false),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        Filter::Or(children) => {
            let mut result = Some(false);
            for child in children {
                match evaluate(child, record, schema) {
                    Some(true) => return Some(true),
                    None => result = None,
                    Some(false) => {}
                }
            }
            result
        }
        Filter::Not(child) => evaluate(child, record, schema).map(|r| !r),
        Filter::Present(attr) => Some(record.has_attribute(attr)),
        Filter::Equality(a) | Filter::Approx(a) => {
            compare_values(a, record, schema.equality_rule(&a.attribute), |o| {
                o == Ordering::Equal
            })
        }
        Filter::GreaterOrEqual(a) => {
            compare_values(a, record, schema.ordering_rule(&a.attribute), |o| {
                o != Ordering::Less
            })
        }
        Filter::LessOrEqual(a) => {
            compare_values(a, record, schema.ordering_rule(&a.attribute), |o| {
                o != Ordering::Greater
            })
        }
        Filter::Substring(s) => {
            let rule = schema
                .substring_rule(&s.attribute)
                .or_else(|| schema.equality_rule(&s.attribute))?;
            let mut undefined = false;
            for value in record.values(&s.attribute) {
                match substring_matches(s, value, rule) {
                    Some(true) => return Some(true),
                    None => undefined = true,
                    Some(false) => {}
                }
            }
            if undefined {
                None
            } else {
                Some(false)
            }
        }
    }
}

fn compare_values(
    assertion: &Assertion,
    record: &Record,
    rule: Option<MatchingRule>,
    accept: impl Fn(Ordering) -> bool,
) -> Option<bool> {
    let rule = rule?;
    let mut undefined = false;
    for value in record.values(&assertion.attribute) {
        match rule.compare(value, &assertion.value) {
            Ok(ordering) if accept(ordering) => return Some(true),
            Ok(_) => {}
            Err(_) => undefined = true,
        }
    }
    if undefined {
        None
    } else {
        Some(false)
    }
}

fn substring_matches(assertion: &SubstringAssertion, value: &str, rule: MatchingRule) -> Option<bool> {
    let value = rule.normalize(value).ok()?;
    let mut cursor = 0;

    if let Some(initial) = &assertion.initial {
        let initial = rule.normalize(initial).ok()?;
        if !value.starts_with(&initial) {
            return Some(false);
        }
        cursor = initial.len();
    }

    for fragment in &assertion.any {
        let fragment = rule.normalize(fragment).ok()?;
        match value[cursor..].find(&fragment) {
            Some(pos) => cursor += pos + fragment.len(),
            None => return Some(false),
        }
    }

    if let Some(last) = &assertion.last {
        let last = rule.normalize(last).ok()?;
        if value.len() < cursor + last.len() || !value.ends_with(&last) {
            return Some(false);
        }
    }

    Some(true)
}
