// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Sled-backed record store
//!
//! Two trees are used:
//! - `records`: DN -> bincode-encoded `StoredRecord`
//! - `tags`: `<tag>\0<dn>` -> empty, so the records of a tag are a prefix scan

use log::{debug, warn};
use std::collections::BTreeSet;
use std::path::Path;

use super::{AddOutcome, QueryTag, Record, RecordStore, StoredRecord};
use crate::dn::Dn;
use crate::error::{StoreError, StoreResult};
use crate::filter::{self, Filter};
use crate::query::Scope;
use crate::schema::AttributeSchema;

const RECORDS_TREE: &str = "records";
const TAGS_TREE: &str = "tags";

/// Persistent record store on top of sled
pub struct SledStore {
    db: sled::Db,
    records: sled::Tree,
    tags: sled::Tree,
}

impl SledStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Store backed by a throwaway database
    pub fn temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> StoreResult<Self> {
        let records = db.open_tree(RECORDS_TREE)?;
        let tags = db.open_tree(TAGS_TREE)?;
        debug!("Opened sled record store with {} records", records.len());
        Ok(Self { db, records, tags })
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn load(&self, key: &Dn) -> StoreResult<Option<StoredRecord>> {
        match self.records.get(key.to_string().as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, stored: &StoredRecord) -> StoreResult<()> {
        let bytes = bincode::serialize(stored)?;
        self.records
            .insert(stored.record.dn.to_string().as_bytes(), bytes)?;
        Ok(())
    }

    fn tag_key(tag: &QueryTag, key: &Dn) -> Vec<u8> {
        let mut bytes = tag_prefix(tag);
        bytes.extend_from_slice(key.to_string().as_bytes());
        bytes
    }

    fn decode_all(&self) -> impl Iterator<Item = StoreResult<StoredRecord>> + '_ {
        self.records.iter().map(|entry| {
            let (_, bytes) = entry?;
            Ok(bincode::deserialize::<StoredRecord>(&bytes)?)
        })
    }
}

fn tag_prefix(tag: &QueryTag) -> Vec<u8> {
    let mut bytes = tag.as_str().as_bytes().to_vec();
    bytes.push(0);
    bytes
}

impl RecordStore for SledStore {
    fn add(&self, record: &Record, tag: &QueryTag) -> StoreResult<AddOutcome> {
        let outcome = match self.load(&record.dn)? {
            Some(mut existing) => {
                existing.record.merge(record);
                existing.tags.insert(tag.clone());
                self.save(&existing)?;
                AddOutcome::Merged
            }
            None => {
                let mut tags = BTreeSet::new();
                tags.insert(tag.clone());
                self.save(&StoredRecord {
                    record: record.clone(),
                    tags,
                })?;
                AddOutcome::Added
            }
        };
        self.tags.insert(Self::tag_key(tag, &record.dn), &[] as &[u8])?;
        Ok(outcome)
    }

    fn find_by_tag(&self, tag: &QueryTag) -> StoreResult<Vec<StoredRecord>> {
        let prefix = tag_prefix(tag);
        let mut found = Vec::new();

        for entry in self.tags.scan_prefix(&prefix) {
            let (key, _) = entry?;
            let dn = std::str::from_utf8(&key[prefix.len()..])
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let dn = Dn::parse(dn).map_err(|e| StoreError::Serialization(e.to_string()))?;
            match self.load(&dn)? {
                Some(stored) if stored.tags.contains(tag) => found.push(stored),
                _ => warn!("Stale tag index entry {} -> {}", tag, dn),
            }
        }

        Ok(found)
    }

    fn delete_by_key(&self, key: &Dn) -> StoreResult<()> {
        let stored = self
            .load(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        for tag in &stored.tags {
            self.tags.remove(Self::tag_key(tag, key))?;
        }
        self.records.remove(key.to_string().as_bytes())?;
        Ok(())
    }

    fn update_tags(&self, key: &Dn, tags: BTreeSet<QueryTag>) -> StoreResult<()> {
        let mut stored = self
            .load(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        for removed in stored.tags.difference(&tags) {
            self.tags.remove(Self::tag_key(removed, key))?;
        }
        for added in tags.difference(&stored.tags) {
            self.tags.insert(Self::tag_key(added, key), &[] as &[u8])?;
        }

        stored.tags = tags;
        self.save(&stored)
    }

    fn find_by_filter(
        &self,
        base: &Dn,
        scope: Scope,
        filter: &Filter,
        schema: &dyn AttributeSchema,
    ) -> StoreResult<Vec<Record>> {
        let mut found = Vec::new();
        for stored in self.decode_all() {
            let stored = stored?;
            if scope.covers(base, &stored.record.dn)
                && filter::matches(filter, &stored.record, schema)
            {
                found.push(stored.record);
            }
        }
        found.sort_by(|a, b| a.dn.cmp(&b.dn));
        Ok(found)
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.records.len())
    }

    fn clear(&self) -> StoreResult<()> {
        self.records.clear()?;
        self.tags.clear()?;
        Ok(())
    }
}
