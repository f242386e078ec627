// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Live search backend interface
//!
//! The cache forwards misses to a `SearchBackend`, which streams entries and a
//! final status into a `SearchSink`. A backend that returns without reporting a
//! status has abandoned the search; nothing from it is cached.

use log::trace;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::dn::Dn;
use crate::error::CacheResult;
use crate::filter;
use crate::query::Query;
use crate::schema::{AttributeSchema, DefaultSchema};
use crate::store::Record;

/// Final status of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    Success,
    SizeLimitExceeded,
    Error,
}

/// Receiver of search results
pub trait SearchSink {
    fn on_entry(&mut self, record: &Record);
    fn on_result(&mut self, status: SearchStatus);
}

/// Sink that keeps everything it is sent
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub entries: Vec<Record>,
    pub status: Option<SearchStatus>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchSink for CollectingSink {
    fn on_entry(&mut self, record: &Record) {
        self.entries.push(record.clone());
    }

    fn on_result(&mut self, status: SearchStatus) {
        self.status = Some(status);
    }
}

/// A directory that can answer searches live
pub trait SearchBackend: Send + Sync {
    fn search(&self, query: &Query, sink: &mut dyn SearchSink) -> CacheResult<()>;
}

/// In-memory directory, used by tests and the replay tool
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<Dn, Record>>,
    schema: Arc<dyn AttributeSchema>,
    size_limit: Option<usize>,
    searches: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_schema(Arc::new(DefaultSchema::new()))
    }

    pub fn with_schema(schema: Arc<dyn AttributeSchema>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            schema,
            size_limit: None,
            searches: AtomicUsize::new(0),
        }
    }

    /// Report `SizeLimitExceeded` once more than `limit` entries match
    pub fn with_size_limit(mut self, limit: usize) -> Self {
        self.size_limit = Some(limit);
        self
    }

    pub fn insert(&self, record: Record) {
        self.entries.write().insert(record.dn.clone(), record);
    }

    pub fn remove(&self, dn: &Dn) -> Option<Record> {
        self.entries.write().remove(dn)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of searches executed so far
    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::Relaxed)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchBackend for MemoryBackend {
    fn search(&self, query: &Query, sink: &mut dyn SearchSink) -> CacheResult<()> {
        self.searches.fetch_add(1, Ordering::Relaxed);
        trace!("Live search {}", query);

        let entries = self.entries.read();
        let mut sent = 0;
        for record in entries.values() {
            if !query.scope.covers(&query.base, &record.dn)
                || !filter::matches(&query.filter, record, self.schema.as_ref())
            {
                continue;
            }
            if self.size_limit.is_some_and(|limit| sent >= limit) {
                sink.on_result(SearchStatus::SizeLimitExceeded);
                return Ok(());
            }
            let projected = record.project(&query.attributes, self.schema.as_ref(), query.attrs_only);
            sink.on_entry(&projected);
            sent += 1;
        }

        sink.on_result(SearchStatus::Success);
        Ok(())
    }
}
