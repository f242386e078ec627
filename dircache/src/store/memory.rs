// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory record store

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

use super::{AddOutcome, QueryTag, Record, RecordStore, StoredRecord};
use crate::dn::Dn;
use crate::error::{StoreError, StoreResult};
use crate::filter::{self, Filter};
use crate::query::Scope;
use crate::schema::AttributeSchema;

/// Record store backed by a `HashMap`, for tests and ephemeral caches
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Dn, StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a single stored record
    pub fn get(&self, key: &Dn) -> Option<StoredRecord> {
        self.records.read().get(key).cloned()
    }
}

impl RecordStore for MemoryStore {
    fn add(&self, record: &Record, tag: &QueryTag) -> StoreResult<AddOutcome> {
        let mut records = self.records.write();
        match records.get_mut(&record.dn) {
            Some(existing) => {
                existing.record.merge(record);
                existing.tags.insert(tag.clone());
                Ok(AddOutcome::Merged)
            }
            None => {
                let mut tags = BTreeSet::new();
                tags.insert(tag.clone());
                records.insert(
                    record.dn.clone(),
                    StoredRecord {
                        record: record.clone(),
                        tags,
                    },
                );
                Ok(AddOutcome::Added)
            }
        }
    }

    fn find_by_tag(&self, tag: &QueryTag) -> StoreResult<Vec<StoredRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|stored| stored.tags.contains(tag))
            .cloned()
            .collect())
    }

    fn delete_by_key(&self, key: &Dn) -> StoreResult<()> {
        self.records
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn update_tags(&self, key: &Dn, tags: BTreeSet<QueryTag>) -> StoreResult<()> {
        let mut records = self.records.write();
        let stored = records
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        stored.tags = tags;
        Ok(())
    }

    fn find_by_filter(
        &self,
        base: &Dn,
        scope: Scope,
        filter: &Filter,
        schema: &dyn AttributeSchema,
    ) -> StoreResult<Vec<Record>> {
        let records = self.records.read();
        let mut found: Vec<Record> = records
            .values()
            .filter(|stored| scope.covers(base, &stored.record.dn))
            .filter(|stored| filter::matches(filter, &stored.record, schema))
            .map(|stored| stored.record.clone())
            .collect();
        found.sort_by(|a, b| a.dn.cmp(&b.dn));
        Ok(found)
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.records.read().len())
    }

    fn clear(&self) -> StoreResult<()> {
        self.records.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DefaultSchema;

    fn record(dn: &str, cn: &str) -> Record {
        Record::new(Dn::parse(dn).unwrap()).with_attribute("cn", [cn])
    }

    #[test]
    fn test_add_merges_existing_key() {
        let store = MemoryStore::new();
        let t1 = QueryTag::from("t1");
        let t2 = QueryTag::from("t2");

        assert_eq!(store.add(&record("cn=a,o=x", "a"), &t1).unwrap(), AddOutcome::Added);
        assert_eq!(store.add(&record("cn=a,o=x", "a2"), &t2).unwrap(), AddOutcome::Merged);
        assert_eq!(store.len().unwrap(), 1);

        let stored = store.get(&Dn::parse("cn=a,o=x").unwrap()).unwrap();
        assert_eq!(stored.tags.len(), 2);
        assert_eq!(stored.record.values("cn").len(), 2);
    }

    #[test]
    fn test_tag_lookup_and_update() {
        let store = MemoryStore::new();
        let t1 = QueryTag::from("t1");
        store.add(&record("cn=a,o=x", "a"), &t1).unwrap();
        store.add(&record("cn=b,o=x", "b"), &t1).unwrap();

        assert_eq!(store.find_by_tag(&t1).unwrap().len(), 2);

        let key = Dn::parse("cn=a,o=x").unwrap();
        store.update_tags(&key, BTreeSet::new()).unwrap();
        assert_eq!(store.find_by_tag(&t1).unwrap().len(), 1);

        store.delete_by_key(&key).unwrap();
        assert!(matches!(store.delete_by_key(&key), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_find_by_filter_respects_scope() {
        let store = MemoryStore::new();
        let tag = QueryTag::from("t");
        store.add(&record("ou=people,o=x", "people"), &tag).unwrap();
        store.add(&record("cn=a,ou=people,o=x", "alice"), &tag).unwrap();
        store.add(&record("cn=b,cn=a,ou=people,o=x", "alice"), &tag).unwrap();

        let schema = DefaultSchema::new();
        let filter = Filter::parse("(cn=alice)").unwrap();
        let base = Dn::parse("ou=people,o=x").unwrap();

        let sub = store.find_by_filter(&base, Scope::Subtree, &filter, &schema).unwrap();
        assert_eq!(sub.len(), 2);
        let one = store.find_by_filter(&base, Scope::OneLevel, &filter, &schema).unwrap();
        assert_eq!(one.len(), 1);
        let exact = store.find_by_filter(&base, Scope::Base, &filter, &schema).unwrap();
        assert!(exact.is_empty());
    }
}
