// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Normalized distinguished names
//!
//! Only what the cache needs: normalization for comparison, suffix tests
//! for base/scope subsumption and parent lookup for one-level scopes.

use crate::error::FilterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A normalized distinguished name. `rdns[0]` is the leftmost (most specific) RDN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dn {
    rdns: Vec<String>,
}

impl Dn {
    /// The empty DN (root of the tree)
    pub fn root() -> Self {
        Self { rdns: Vec::new() }
    }

    /// Parse and normalize a DN string.
    ///
    /// Attribute types and values are case-folded and whitespace around `=`
    /// and `,` is dropped. Escaped commas stay part of their RDN.
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut rdns = Vec::new();
        for raw in split_unescaped(trimmed, ',') {
            let (attr, value) = raw
                .split_once('=')
                .ok_or_else(|| FilterError::InvalidDn(input.to_string()))?;
            let attr = attr.trim();
            let value = value.trim();
            if attr.is_empty() || value.is_empty() {
                return Err(FilterError::InvalidDn(input.to_string()));
            }
            rdns.push(format!("{}={}", attr.to_lowercase(), value.to_lowercase()));
        }

        Ok(Self { rdns })
    }

    /// Immediate parent, `None` for the root
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Self {
                rdns: self.rdns[1..].to_vec(),
            })
        }
    }

    /// True when `self` equals `other` or is one of its ancestors
    /// (i.e. `self` is an RDN-wise suffix of `other`).
    pub fn is_ancestor_or_self(&self, other: &Dn) -> bool {
        if self.rdns.len() > other.rdns.len() {
            return false;
        }
        let offset = other.rdns.len() - self.rdns.len();
        other.rdns[offset..] == self.rdns[..]
    }
}

fn split_unescaped(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (idx, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
        } else if ch == separator {
            parts.push(&input[start..idx]);
            start = idx + ch.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rdns.join(","))
    }
}

impl FromStr for Dn {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dn::parse(s)
    }
}

impl TryFrom<String> for Dn {
    type Error = FilterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Dn::parse(&value)
    }
}

impl From<Dn> for String {
    fn from(dn: Dn) -> Self {
        dn.to_string()
    }
}
