// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Search requests: filter, base, scope and requested attributes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::dn::Dn;
use crate::error::FilterError;
use crate::filter::{parse_filter, Filter};
use crate::schema::AttributeSchema;

/// Search scope. Ordered from narrowest to broadest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Base,
    OneLevel,
    Subtree,
}

impl Scope {
    /// Whether an entry at `dn` falls inside a search rooted at `base`
    pub fn covers(&self, base: &Dn, dn: &Dn) -> bool {
        match self {
            Scope::Base => base == dn,
            Scope::OneLevel => dn.parent().as_ref() == Some(base),
            Scope::Subtree => base.is_ancestor_or_self(dn),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scope::Base => "base",
            Scope::OneLevel => "one",
            Scope::Subtree => "sub",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Scope {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(Scope::Base),
            "one" | "onelevel" => Ok(Scope::OneLevel),
            "sub" | "subtree" => Ok(Scope::Subtree),
            other => Err(FilterError::Parse {
                input: other.to_string(),
                reason: "unknown scope".to_string(),
            }),
        }
    }
}

pub const ALL_USER_ATTRIBUTES: &str = "*";
pub const ALL_OPERATIONAL_ATTRIBUTES: &str = "+";

/// Requested attribute list. Empty means "all user attributes".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeSelection {
    attributes: Vec<String>,
}

impl AttributeSelection {
    pub fn all() -> Self {
        Self::default()
    }

    /// Lowercased, de-duplicated selection preserving request order
    pub fn of<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selection = Self::default();
        for attr in attributes {
            selection.push(attr.as_ref());
        }
        selection
    }

    fn push(&mut self, attribute: &str) {
        let attribute = attribute.trim().to_lowercase();
        if !attribute.is_empty() && !self.attributes.contains(&attribute) {
            self.attributes.push(attribute);
        }
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// No explicit list, or only `*`
    pub fn is_unspecified(&self) -> bool {
        self.attributes.is_empty()
            || (self.attributes.len() == 1 && self.attributes[0] == ALL_USER_ATTRIBUTES)
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }

    pub fn all_user_attributes(&self) -> bool {
        self.attributes.is_empty() || self.contains(ALL_USER_ATTRIBUTES)
    }

    pub fn all_operational_attributes(&self) -> bool {
        self.contains(ALL_OPERATIONAL_ATTRIBUTES)
    }

    /// Whether a record attribute should be returned for this selection
    pub fn selects(&self, attribute: &str, operational: bool) -> bool {
        if self.contains(attribute) {
            return true;
        }
        if operational {
            self.all_operational_attributes()
        } else {
            self.all_user_attributes()
        }
    }

    /// Selection used for the live search of a query that will be cached:
    /// adds `objectclass` and every attribute the filter references, unless
    /// `*` or `+` already returns it.
    pub fn widened(&self, filter_attributes: &[String], schema: &dyn AttributeSchema) -> Self {
        if self.attributes.is_empty() {
            let mut widened = Self::default();
            widened.push(ALL_USER_ATTRIBUTES);
            for attr in filter_attributes {
                if schema.is_operational(attr) {
                    widened.push(attr);
                }
            }
            return if widened.attributes.len() == 1 {
                Self::default()
            } else {
                widened
            };
        }

        let mut widened = self.clone();
        if !widened.all_user_attributes() {
            widened.push("objectclass");
        }
        for attr in filter_attributes {
            let operational = schema.is_operational(attr);
            if operational && widened.all_operational_attributes() {
                continue;
            }
            if !operational && widened.all_user_attributes() {
                continue;
            }
            widened.push(attr);
        }
        widened
    }
}

/// A search request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub filter: Filter,
    pub base: Dn,
    pub scope: Scope,
    #[serde(default)]
    pub attributes: AttributeSelection,
    #[serde(default)]
    pub attrs_only: bool,
}

impl Query {
    pub fn new(filter: Filter, base: Dn, scope: Scope) -> Self {
        Self {
            filter,
            base,
            scope,
            attributes: AttributeSelection::all(),
            attrs_only: false,
        }
    }

    /// Build a query from its string forms
    pub fn parse(base: &str, scope: Scope, filter: &str) -> Result<Self, FilterError> {
        Ok(Self::new(parse_filter(filter)?, Dn::parse(base)?, scope))
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.attributes = AttributeSelection::of(attributes);
        self
    }

    pub fn with_attrs_only(mut self, attrs_only: bool) -> Self {
        self.attrs_only = attrs_only;
        self
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "base=\"{}\" scope={} filter={}", self.base, self.scope, self.filter)?;
        if !self.attributes.attributes().is_empty() {
            write!(f, " attrs={}", self.attributes.attributes().join(","))?;
        }
        Ok(())
    }
}
