// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Record store for cached search results
//!
//! Stored records carry the set of query tags that own them. A record written
//! by two cached queries is kept until both tags are gone.

pub mod memory;
#[cfg(feature = "sled-backend")]
pub mod sled;

pub use memory::MemoryStore;
#[cfg(feature = "sled-backend")]
pub use self::sled::SledStore;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::dn::Dn;
use crate::error::StoreResult;
use crate::filter::Filter;
use crate::query::{AttributeSelection, Scope};
use crate::schema::AttributeSchema;

/// Identifier a cached query stamps on the records it stores
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueryTag(String);

impl QueryTag {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for QueryTag {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for QueryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directory entry. Attribute names are lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub dn: Dn,
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl Record {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .entry(name.to_lowercase())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn values(&self, name: &str) -> &[String] {
        self.attributes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(|v| !v.is_empty())
    }

    /// Union the attribute values of `other` into this record
    pub fn merge(&mut self, other: &Record) {
        for (name, values) in &other.attributes {
            let existing = self.attributes.entry(name.clone()).or_default();
            for value in values {
                if !existing.contains(value) {
                    existing.push(value.clone());
                }
            }
        }
    }

    /// Copy of the record restricted to what `selection` asks for
    pub fn project(
        &self,
        selection: &AttributeSelection,
        schema: &dyn AttributeSchema,
        attrs_only: bool,
    ) -> Record {
        let attributes = self
            .attributes
            .iter()
            .filter(|(name, _)| selection.selects(name, schema.is_operational(name)))
            .map(|(name, values)| {
                let values = if attrs_only { Vec::new() } else { values.clone() };
                (name.clone(), values)
            })
            .collect();

        Record {
            dn: self.dn.clone(),
            attributes,
        }
    }
}

/// A record together with the tags of the cached queries that own it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub record: Record,
    pub tags: BTreeSet<QueryTag>,
}

/// Result of adding a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The key was new; the record count grew by one
    Added,
    /// The key existed; values and tags were merged into it
    Merged,
}

/// Storage for cached records, keyed by DN
pub trait RecordStore: Send + Sync {
    /// Add a record tagged with `tag`, merging into an existing record
    fn add(&self, record: &Record, tag: &QueryTag) -> StoreResult<AddOutcome>;

    /// All records carrying `tag`
    fn find_by_tag(&self, tag: &QueryTag) -> StoreResult<Vec<StoredRecord>>;

    fn delete_by_key(&self, key: &Dn) -> StoreResult<()>;

    /// Replace the tag set of an existing record
    fn update_tags(&self, key: &Dn, tags: BTreeSet<QueryTag>) -> StoreResult<()>;

    /// Records under `base`/`scope` matching `filter`
    fn find_by_filter(
        &self,
        base: &Dn,
        scope: Scope,
        filter: &Filter,
        schema: &dyn AttributeSchema,
    ) -> StoreResult<Vec<Record>>;

    fn len(&self) -> StoreResult<usize>;

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every record
    fn clear(&self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DefaultSchema;

    #[test]
    fn test_merge_unions_values() {
        let dn = Dn::parse("cn=a").unwrap();
        let mut left = Record::new(dn.clone()).with_attribute("mail", ["a@x"]);
        let right = Record::new(dn)
            .with_attribute("mail", ["a@x", "b@x"])
            .with_attribute("sn", ["A"]);
        left.merge(&right);
        assert_eq!(left.values("mail"), &["a@x".to_string(), "b@x".to_string()]);
        assert_eq!(left.values("sn"), &["A".to_string()]);
    }

    #[test]
    fn test_projection() {
        let schema = DefaultSchema::new();
        let record = Record::new(Dn::parse("cn=a").unwrap())
            .with_attribute("cn", ["a"])
            .with_attribute("mail", ["a@x"])
            .with_attribute("createTimestamp", ["20240101000000Z"]);

        let projected = record.project(&AttributeSelection::of(["mail"]), &schema, false);
        assert_eq!(projected.attributes.len(), 1);
        assert!(projected.has_attribute("mail"));

        let projected = record.project(&AttributeSelection::all(), &schema, false);
        assert!(projected.has_attribute("cn"));
        assert!(!projected.has_attribute("createtimestamp"));

        let projected = record.project(&AttributeSelection::of(["+"]), &schema, true);
        assert_eq!(projected.attributes.keys().collect::<Vec<_>>(), vec!["createtimestamp"]);
        assert!(projected.values("createtimestamp").is_empty());
    }
}
