// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Search filter AST
//!
//! This module provides:
//! - The filter tree (`Filter`) with the comparable operators the cache understands
//! - RFC 4515 string parsing (`parser`) and rendering (`Display`)
//! - Template shape rendering: the filter with every assertion value stripped
//! - A reference evaluator (`eval`) used by the in-memory store and backend

pub mod eval;
pub mod parser;

pub use eval::matches;
pub use parser::parse_filter;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute value assertion: `(attribute <op> value)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assertion {
    pub attribute: String,
    pub value: String,
}

impl Assertion {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into().to_lowercase(),
            value: value.into(),
        }
    }
}

/// Substring assertion: `(attribute=initial*any*...*last)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SubstringAssertion {
    pub attribute: String,
    pub initial: Option<String>,
    pub any: Vec<String>,
    pub last: Option<String>,
}

impl SubstringAssertion {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into().to_lowercase(),
            ..Default::default()
        }
    }

    pub fn with_initial(mut self, initial: impl Into<String>) -> Self {
        self.initial = Some(initial.into());
        self
    }

    pub fn with_any(mut self, fragment: impl Into<String>) -> Self {
        self.any.push(fragment.into());
        self
    }

    pub fn with_last(mut self, last: impl Into<String>) -> Self {
        self.last = Some(last.into());
        self
    }
}

/// A search filter tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality(Assertion),
    GreaterOrEqual(Assertion),
    LessOrEqual(Assertion),
    Approx(Assertion),
    Substring(SubstringAssertion),
    Present(String),
}

impl Filter {
    pub fn parse(input: &str) -> Result<Filter, crate::error::FilterError> {
        parse_filter(input)
    }

    pub fn equality(attribute: &str, value: &str) -> Self {
        Filter::Equality(Assertion::new(attribute, value))
    }

    pub fn present(attribute: &str) -> Self {
        Filter::Present(attribute.to_lowercase())
    }

    /// Value-free shape of the filter, e.g. `(&(cn=)(mail=*))`
    pub fn shape(&self) -> String {
        let mut shape = String::new();
        let mut attributes = Vec::new();
        self.render_shape(&mut shape, &mut attributes);
        shape
    }

    /// Renders the shape and collects the attribute descriptors the filter
    /// references, in order of appearance and without duplicates.
    pub fn render_shape(&self, out: &mut String, attributes: &mut Vec<String>) {
        let leaf = |out: &mut String, attributes: &mut Vec<String>, attr: &str, op: &str| {
            out.push('(');
            out.push_str(attr);
            out.push_str(op);
            out.push(')');
            if !attributes.iter().any(|a| a == attr) {
                attributes.push(attr.to_string());
            }
        };

        match self {
            Filter::Equality(a) => leaf(out, attributes, &a.attribute, "="),
            Filter::GreaterOrEqual(a) => leaf(out, attributes, &a.attribute, ">="),
            Filter::LessOrEqual(a) => leaf(out, attributes, &a.attribute, "<="),
            Filter::Approx(a) => leaf(out, attributes, &a.attribute, "~="),
            Filter::Substring(s) => leaf(out, attributes, &s.attribute, "="),
            Filter::Present(attr) => leaf(out, attributes, attr, "=*"),
            Filter::And(children) | Filter::Or(children) => {
                out.push('(');
                out.push(if matches!(self, Filter::And(_)) { '&' } else { '|' });
                for child in children {
                    child.render_shape(out, attributes);
                }
                out.push(')');
            }
            Filter::Not(child) => {
                out.push_str("(!");
                child.render_shape(out, attributes);
                out.push(')');
            }
        }
    }

    /// Attribute descriptors referenced anywhere in the filter
    pub fn referenced_attributes(&self) -> Vec<String> {
        let mut shape = String::new();
        let mut attributes = Vec::new();
        self.render_shape(&mut shape, &mut attributes);
        attributes
    }
}

/// Escapes an assertion value for the string representation (RFC 4515 section 3)
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            other => escaped.push(other),
        }
    }
    escaped
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(children) => {
                write!(f, "(&")?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Filter::Or(children) => {
                write!(f, "(|")?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Filter::Not(child) => write!(f, "(!{})", child),
            Filter::Equality(a) => write!(f, "({}={})", a.attribute, escape_value(&a.value)),
            Filter::GreaterOrEqual(a) => {
                write!(f, "({}>={})", a.attribute, escape_value(&a.value))
            }
            Filter::LessOrEqual(a) => write!(f, "({}<={})", a.attribute, escape_value(&a.value)),
            Filter::Approx(a) => write!(f, "({}~={})", a.attribute, escape_value(&a.value)),
            Filter::Substring(s) => {
                write!(f, "({}=", s.attribute)?;
                if let Some(initial) = &s.initial {
                    write!(f, "{}", escape_value(initial))?;
                }
                write!(f, "*")?;
                for fragment in &s.any {
                    write!(f, "{}*", escape_value(fragment))?;
                }
                if let Some(last) = &s.last {
                    write!(f, "{}", escape_value(last))?;
                }
                write!(f, ")")
            }
            Filter::Present(attr) => write!(f, "({}=*)", attr),
        }
    }
}
