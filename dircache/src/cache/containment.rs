// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Containment of an incoming search in a cached one
//!
//! A cached search contains an incoming one when every entry the incoming
//! search can return is also returned by the cached search. The check is
//! structural: both filters are walked in lock-step and each leaf pair is
//! compared with the attribute's matching rule. It is sound but not complete,
//! so a negative answer only means "not provable".

use log::debug;
use std::cmp::Ordering;

use crate::dn::Dn;
use crate::error::MatchError;
use crate::filter::{Assertion, Filter, SubstringAssertion};
use crate::query::{Query, Scope};
use crate::schema::{require_rule, AttributeSchema, MatchingRule};

/// Outcome of a containment check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// The cached search provably returns everything the incoming one does
    Contained,
    /// The structures line up but the values do not imply containment
    NotContained,
    /// The filters cannot be compared node by node
    Incomparable,
}

impl Containment {
    pub fn is_contained(self) -> bool {
        self == Containment::Contained
    }
}

/// Base/scope subsumption: the cached region must cover the incoming one
pub fn scope_contains(
    cached_base: &Dn,
    cached_scope: Scope,
    incoming_base: &Dn,
    incoming_scope: Scope,
) -> bool {
    if cached_scope < incoming_scope || !cached_base.is_ancestor_or_self(incoming_base) {
        return false;
    }

    match cached_scope {
        Scope::Base => cached_base == incoming_base,
        Scope::OneLevel => match incoming_scope {
            Scope::Base => incoming_base.parent().as_ref() == Some(cached_base),
            Scope::OneLevel => cached_base == incoming_base,
            Scope::Subtree => false,
        },
        Scope::Subtree => true,
    }
}

/// Full check: base/scope, then filter
pub fn query_contains(cached: &Query, incoming: &Query, schema: &dyn AttributeSchema) -> Containment {
    if !scope_contains(&cached.base, cached.scope, &incoming.base, incoming.scope) {
        return Containment::NotContained;
    }
    filter_contains(&cached.filter, &incoming.filter, schema)
}

/// Filter containment. A matching rule failure refutes the candidate.
pub fn filter_contains(cached: &Filter, incoming: &Filter, schema: &dyn AttributeSchema) -> Containment {
    match check(cached, incoming, schema) {
        Ok(result) => result,
        Err(e) => {
            debug!("Containment check of {} against {} aborted: {}", incoming, cached, e);
            Containment::NotContained
        }
    }
}

fn check(cached: &Filter, incoming: &Filter, schema: &dyn AttributeSchema) -> Result<Containment, MatchError> {
    match (cached, incoming) {
        (Filter::And(cached_children), Filter::And(incoming_children))
        | (Filter::Or(cached_children), Filter::Or(incoming_children)) => {
            if cached_children.len() != incoming_children.len() {
                return Ok(Containment::Incomparable);
            }
            for (c, i) in cached_children.iter().zip(incoming_children) {
                let result = check(c, i, schema)?;
                if !result.is_contained() {
                    return Ok(result);
                }
            }
            Ok(Containment::Contained)
        }

        // Negation flips the direction of containment; not attempted
        (Filter::Not(_), Filter::Not(_)) => Ok(Containment::NotContained),

        (Filter::Present(c), Filter::Present(i)) => Ok(same_attribute(c, i, Containment::Contained)),

        (Filter::Equality(c), Filter::Equality(i)) => {
            compare_assertions(c, i, schema.equality_rule(&c.attribute), "equality", |o| {
                o == Ordering::Equal
            })
        }

        // (a>=c) contains (a>=i) when c <= i
        (Filter::GreaterOrEqual(c), Filter::GreaterOrEqual(i)) => {
            compare_assertions(c, i, schema.ordering_rule(&c.attribute), "ordering", |o| {
                o != Ordering::Greater
            })
        }

        // (a<=c) contains (a<=i) when c >= i
        (Filter::LessOrEqual(c), Filter::LessOrEqual(i)) => {
            compare_assertions(c, i, schema.ordering_rule(&c.attribute), "ordering", |o| {
                o != Ordering::Less
            })
        }

        (Filter::Substring(c), Filter::Substring(i)) => {
            if c.attribute != i.attribute {
                return Ok(Containment::Incomparable);
            }
            let rule = substring_rule(schema, &c.attribute)?;
            Ok(verdict(substring_contains_substring(c, i, rule)?))
        }

        (Filter::Substring(c), Filter::Equality(i)) => {
            if c.attribute != i.attribute {
                return Ok(Containment::Incomparable);
            }
            let rule = substring_rule(schema, &c.attribute)?;
            Ok(verdict(substring_contains_value(c, &i.value, rule)?))
        }

        // Equality never implies a substring match in the needed direction
        (Filter::Equality(_), Filter::Substring(_)) => Ok(Containment::NotContained),

        (Filter::Approx(_), Filter::Approx(_)) => Ok(Containment::NotContained),

        _ => Ok(Containment::Incomparable),
    }
}

fn verdict(contained: bool) -> Containment {
    if contained {
        Containment::Contained
    } else {
        Containment::NotContained
    }
}

fn same_attribute(cached: &str, incoming: &str, result: Containment) -> Containment {
    if cached == incoming {
        result
    } else {
        Containment::Incomparable
    }
}

/// Compares `cached` to `incoming` under `rule` and applies `accept`
fn compare_assertions(
    cached: &Assertion,
    incoming: &Assertion,
    rule: Option<MatchingRule>,
    kind: &'static str,
    accept: impl Fn(Ordering) -> bool,
) -> Result<Containment, MatchError> {
    if cached.attribute != incoming.attribute {
        return Ok(Containment::Incomparable);
    }
    let rule = require_rule(rule, &cached.attribute, kind)?;
    let ordering = rule.compare(&cached.value, &incoming.value)?;
    Ok(verdict(accept(ordering)))
}

fn substring_rule(schema: &dyn AttributeSchema, attribute: &str) -> Result<MatchingRule, MatchError> {
    require_rule(
        schema
            .substring_rule(attribute)
            .or_else(|| schema.equality_rule(attribute)),
        attribute,
        "substring",
    )
}

fn normalize_opt(value: &Option<String>, rule: MatchingRule) -> Result<Option<String>, MatchError> {
    value.as_deref().map(|v| rule.normalize(v)).transpose()
}

/// Removes `needle` from the front of `haystack`
fn strip_initial(haystack: &mut String, needle: &str) -> bool {
    if haystack.starts_with(needle) {
        haystack.drain(..needle.len());
        true
    } else {
        false
    }
}

/// Removes `needle` from the end of `haystack`
fn strip_final(haystack: &mut String, needle: &str) -> bool {
    if haystack.ends_with(needle) {
        haystack.truncate(haystack.len() - needle.len());
        true
    } else {
        false
    }
}

/// Removes everything up to and including the first occurrence of `needle`
fn consume_through(haystack: &mut String, needle: &str) -> bool {
    match haystack.find(needle) {
        Some(pos) => {
            haystack.drain(..pos + needle.len());
            true
        }
        None => false,
    }
}

/// Every cached "any" fragment must be found, in order, inside the remaining
/// incoming fragments. Several cached fragments may come out of one incoming
/// fragment; a fragment is never revisited once passed.
fn fragments_in_order(cached_any: &[String], mut remaining: Vec<String>) -> bool {
    let mut start = 0;
    for fragment in cached_any {
        let found = (start..remaining.len()).find(|&j| consume_through(&mut remaining[j], fragment));
        match found {
            Some(j) => start = j,
            None => return false,
        }
    }
    true
}

fn substring_contains_substring(
    cached: &SubstringAssertion,
    incoming: &SubstringAssertion,
    rule: MatchingRule,
) -> Result<bool, MatchError> {
    // A cached anchor needs a matching anchor on the incoming side
    if (cached.initial.is_some() && incoming.initial.is_none())
        || (cached.last.is_some() && incoming.last.is_none())
    {
        return Ok(false);
    }

    let mut initial = normalize_opt(&incoming.initial, rule)?;
    let mut last = normalize_opt(&incoming.last, rule)?;

    if let (Some(cached_initial), Some(incoming_initial)) = (&cached.initial, initial.as_mut()) {
        if !strip_initial(incoming_initial, &rule.normalize(cached_initial)?) {
            return Ok(false);
        }
    }
    if let (Some(cached_last), Some(incoming_last)) = (&cached.last, last.as_mut()) {
        if !strip_final(incoming_last, &rule.normalize(cached_last)?) {
            return Ok(false);
        }
    }

    if cached.any.is_empty() {
        return Ok(true);
    }

    let mut remaining = Vec::with_capacity(incoming.any.len() + 2);
    remaining.extend(initial);
    for fragment in &incoming.any {
        remaining.push(rule.normalize(fragment)?);
    }
    remaining.extend(last);

    let cached_any = cached
        .any
        .iter()
        .map(|f| rule.normalize(f))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(fragments_in_order(&cached_any, remaining))
}

fn substring_contains_value(
    cached: &SubstringAssertion,
    value: &str,
    rule: MatchingRule,
) -> Result<bool, MatchError> {
    let mut value = rule.normalize(value)?;

    if let Some(initial) = &cached.initial {
        if !strip_initial(&mut value, &rule.normalize(initial)?) {
            return Ok(false);
        }
    }
    if let Some(last) = &cached.last {
        if !strip_final(&mut value, &rule.normalize(last)?) {
            return Ok(false);
        }
    }

    let cached_any = cached
        .any
        .iter()
        .map(|f| rule.normalize(f))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(fragments_in_order(&cached_any, vec![value]))
}
