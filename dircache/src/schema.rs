// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Attribute schema and matching rules
//!
//! The cache never compares assertion values byte-wise. Every comparison goes
//! through the matching rule the schema assigns to the attribute, so that a
//! cached `(cn=Alice)` answers an incoming `(cn=alice)` when `cn` is
//! case-insensitive.

use crate::error::MatchError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Value comparison rule for an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchingRule {
    /// Case-folded, insignificant whitespace collapsed
    CaseIgnore,
    /// Whitespace collapsed, case preserved
    CaseExact,
    /// Signed decimal integers compared numerically
    Integer,
    /// Raw bytes
    OctetString,
}

impl MatchingRule {
    pub fn name(&self) -> &'static str {
        match self {
            MatchingRule::CaseIgnore => "caseIgnoreMatch",
            MatchingRule::CaseExact => "caseExactMatch",
            MatchingRule::Integer => "integerMatch",
            MatchingRule::OctetString => "octetStringMatch",
        }
    }

    /// Normalized form of a value under this rule
    pub fn normalize(&self, value: &str) -> Result<String, MatchError> {
        match self {
            MatchingRule::CaseIgnore => Ok(collapse_whitespace(value).to_lowercase()),
            MatchingRule::CaseExact => Ok(collapse_whitespace(value)),
            MatchingRule::Integer => self.parse_integer(value).map(|n| n.to_string()),
            MatchingRule::OctetString => Ok(value.to_string()),
        }
    }

    /// Total order of two asserted values under this rule
    pub fn compare(&self, left: &str, right: &str) -> Result<Ordering, MatchError> {
        match self {
            MatchingRule::Integer => {
                let left = self.parse_integer(left)?;
                let right = self.parse_integer(right)?;
                Ok(left.cmp(&right))
            }
            _ => Ok(self.normalize(left)?.cmp(&self.normalize(right)?)),
        }
    }

    fn parse_integer(&self, value: &str) -> Result<i64, MatchError> {
        value.trim().parse::<i64>().map_err(|_| MatchError::InvalidValue {
            rule: self.name(),
            value: value.to_string(),
        })
    }
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Matching rules assigned to a single attribute type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeRules {
    pub equality: Option<MatchingRule>,
    pub ordering: Option<MatchingRule>,
    pub substring: Option<MatchingRule>,
}

impl AttributeRules {
    pub fn case_ignore() -> Self {
        Self {
            equality: Some(MatchingRule::CaseIgnore),
            ordering: Some(MatchingRule::CaseIgnore),
            substring: Some(MatchingRule::CaseIgnore),
        }
    }

    pub fn integer() -> Self {
        Self {
            equality: Some(MatchingRule::Integer),
            ordering: Some(MatchingRule::Integer),
            substring: None,
        }
    }

    pub fn equality_only(rule: MatchingRule) -> Self {
        Self {
            equality: Some(rule),
            ordering: None,
            substring: None,
        }
    }
}

/// Schema lookups the cache needs. Attribute names arrive lowercased.
pub trait AttributeSchema: Send + Sync {
    fn equality_rule(&self, attribute: &str) -> Option<MatchingRule>;
    fn ordering_rule(&self, attribute: &str) -> Option<MatchingRule>;
    fn substring_rule(&self, attribute: &str) -> Option<MatchingRule>;
    fn is_operational(&self, attribute: &str) -> bool;
}

/// Resolves a rule or reports which one is missing
pub fn require_rule(
    rule: Option<MatchingRule>,
    attribute: &str,
    kind: &'static str,
) -> Result<MatchingRule, MatchError> {
    rule.ok_or_else(|| MatchError::NoMatchingRule {
        attribute: attribute.to_string(),
        kind,
    })
}

/// Table-driven schema. Attributes without an explicit entry fall back to
/// `CaseIgnore` for every rule.
#[derive(Debug, Clone)]
pub struct DefaultSchema {
    rules: HashMap<String, AttributeRules>,
    operational: HashSet<String>,
    fallback: AttributeRules,
}

impl DefaultSchema {
    pub fn new() -> Self {
        let mut schema = Self {
            rules: HashMap::new(),
            operational: HashSet::new(),
            fallback: AttributeRules::case_ignore(),
        };

        schema = schema
            .with_attribute("objectclass", AttributeRules::equality_only(MatchingRule::CaseIgnore))
            .with_attribute("uidnumber", AttributeRules::integer())
            .with_attribute("gidnumber", AttributeRules::integer())
            .with_attribute("userpassword", AttributeRules::equality_only(MatchingRule::OctetString));

        for operational in [
            "createtimestamp",
            "modifytimestamp",
            "creatorsname",
            "modifiersname",
            "entryuuid",
            "entrydn",
            "subschemasubentry",
            "hassubordinates",
        ] {
            schema.operational.insert(operational.to_string());
        }

        schema
    }

    pub fn with_attribute(mut self, attribute: &str, rules: AttributeRules) -> Self {
        self.rules.insert(attribute.to_lowercase(), rules);
        self
    }

    pub fn with_operational(mut self, attribute: &str) -> Self {
        self.operational.insert(attribute.to_lowercase());
        self
    }

    fn rules_for(&self, attribute: &str) -> &AttributeRules {
        self.rules.get(attribute).unwrap_or(&self.fallback)
    }
}

impl Default for DefaultSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeSchema for DefaultSchema {
    fn equality_rule(&self, attribute: &str) -> Option<MatchingRule> {
        self.rules_for(attribute).equality
    }

    fn ordering_rule(&self, attribute: &str) -> Option<MatchingRule> {
        self.rules_for(attribute).ordering
    }

    fn substring_rule(&self, attribute: &str) -> Option<MatchingRule> {
        self.rules_for(attribute).substring
    }

    fn is_operational(&self, attribute: &str) -> bool {
        self.operational.contains(attribute)
    }
}
