// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query templates and their chains of cached queries

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::query::Query;
use crate::store::QueryTag;

/// Identifier of a cached query. Assigned in admission order.
pub type QueryId = u64;

/// A previously answered search whose results live in the store
#[derive(Debug)]
pub struct CachedQuery {
    pub id: QueryId,
    pub template_id: usize,
    pub query: Query,
    /// `None` marks a negative entry (search returned nothing)
    pub tag: Option<QueryTag>,
    pub admitted_at: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    retired: AtomicBool,
}

impl CachedQuery {
    pub fn new(
        id: QueryId,
        template_id: usize,
        query: Query,
        tag: Option<QueryTag>,
        admitted_at: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            template_id,
            query,
            tag,
            admitted_at,
            expiry,
            retired: AtomicBool::new(false),
        }
    }

    pub fn is_negative(&self) -> bool {
        self.tag.is_none()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }

    /// Set once the query has left its template chain
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }
}

/// Cached queries of one template, ordered by admission and by expiry
#[derive(Debug, Default)]
pub struct TemplateChain {
    by_age: BTreeMap<QueryId, Arc<CachedQuery>>,
    by_expiry: BTreeSet<(DateTime<Utc>, QueryId)>,
}

impl TemplateChain {
    pub fn insert(&mut self, query: Arc<CachedQuery>) {
        self.by_expiry.insert((query.expiry, query.id));
        self.by_age.insert(query.id, query);
    }

    /// Unlink a query and mark it retired
    pub fn remove(&mut self, id: QueryId) -> Option<Arc<CachedQuery>> {
        let query = self.by_age.remove(&id)?;
        self.by_expiry.remove(&(query.expiry, id));
        query.retire();
        Some(query)
    }

    /// Remove and return the earliest-expiring query if it expired by `now`
    pub fn pop_expired(&mut self, now: DateTime<Utc>) -> Option<Arc<CachedQuery>> {
        let (expiry, id) = *self.by_expiry.first()?;
        if expiry > now {
            return None;
        }
        self.remove(id)
    }

    /// Most recently added first
    pub fn newest_first(&self) -> impl Iterator<Item = &Arc<CachedQuery>> {
        self.by_age.values().rev()
    }

    pub fn contains(&self, id: QueryId) -> bool {
        self.by_age.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_age.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_age.is_empty()
    }

    /// Remove every query, retiring each
    pub fn drain(&mut self) -> Vec<Arc<CachedQuery>> {
        self.by_expiry.clear();
        let drained: Vec<Arc<CachedQuery>> =
            std::mem::take(&mut self.by_age).into_values().collect();
        for query in &drained {
            query.retire();
        }
        drained
    }
}

/// A configured template and its chain
#[derive(Debug)]
pub struct QueryTemplate {
    pub id: usize,
    /// Canonical value-free filter shape
    pub shape: String,
    pub attr_set: usize,
    pub ttl: Duration,
    pub negative_ttl: Option<Duration>,
    pub(crate) chain: RwLock<TemplateChain>,
}

impl QueryTemplate {
    pub fn new(
        id: usize,
        shape: String,
        attr_set: usize,
        ttl_secs: u64,
        negative_ttl_secs: u64,
    ) -> Self {
        Self {
            id,
            shape,
            attr_set,
            ttl: duration_from_secs(ttl_secs),
            negative_ttl: (negative_ttl_secs > 0).then(|| duration_from_secs(negative_ttl_secs)),
            chain: RwLock::new(TemplateChain::default()),
        }
    }

    pub fn cached_queries(&self) -> usize {
        self.chain.read().len()
    }
}

/// Seconds as a chrono duration, saturating at the largest representable one
fn duration_from_secs(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}
