// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Admission of live search results into the cache

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::cache_manager::CacheManager;
use super::template::{CachedQuery, QueryId};
use crate::backend::{SearchSink, SearchStatus};
use crate::query::Query;
use crate::store::{AddOutcome, QueryTag, Record};

/// What happened to a search that was executed live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Results were stored and the query registered
    Admitted {
        template_id: usize,
        query_id: QueryId,
        records: usize,
    },
    /// The empty result was registered as a negative entry
    AdmittedNegative { template_id: usize, query_id: QueryId },
    /// No template admits this shape and attribute set
    NotCacheable,
    /// Attribute-names-only searches are never cached
    AttrsOnly,
    /// The cached query limit was reached
    QueryLimitReached,
    /// More records than the per-query limit were returned
    TooManyRecords,
    /// Empty result and the template has no negative TTL
    EmptyResult,
    /// The backend reported a non-success status
    Failed(SearchStatus),
    /// The backend never reported a final status
    Incomplete,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(
            self,
            Admission::Admitted { .. } | Admission::AdmittedNegative { .. }
        )
    }
}

/// A miss the cache intends to admit once the live search completes
#[derive(Debug, Clone)]
pub(crate) struct PendingAdmission {
    pub template_id: usize,
    /// The search as the caller issued it
    pub query: Query,
    /// The search sent to the backend, with widened attributes
    pub live_query: Query,
}

/// Sink placed between the backend and the caller during an admissible miss.
///
/// Entries are forwarded to the caller projected onto the requested
/// attributes, and buffered in full until the per-query limit is passed.
pub(crate) struct ResponseCollector<'a> {
    manager: &'a CacheManager,
    pending: Option<PendingAdmission>,
    caller: &'a mut dyn SearchSink,
    buffered: Vec<Record>,
    over_limit: bool,
    outcome: Option<Admission>,
}

impl<'a> ResponseCollector<'a> {
    pub fn new(
        manager: &'a CacheManager,
        pending: PendingAdmission,
        caller: &'a mut dyn SearchSink,
    ) -> Self {
        Self {
            manager,
            pending: Some(pending),
            caller,
            buffered: Vec::new(),
            over_limit: false,
            outcome: None,
        }
    }

    pub fn finish(self) -> Admission {
        self.outcome.unwrap_or(Admission::Incomplete)
    }
}

impl SearchSink for ResponseCollector<'_> {
    fn on_entry(&mut self, record: &Record) {
        if let Some(pending) = &self.pending {
            let projected = record.project(
                &pending.query.attributes,
                self.manager.schema.as_ref(),
                pending.query.attrs_only,
            );
            self.caller.on_entry(&projected);
        } else {
            self.caller.on_entry(record);
        }

        if self.over_limit {
            return;
        }
        if self.buffered.len() >= self.manager.config.max_records_per_query {
            debug!(
                "Result exceeds {} records, not caching",
                self.manager.config.max_records_per_query
            );
            self.over_limit = true;
            self.buffered.clear();
        } else {
            self.buffered.push(record.clone());
        }
    }

    fn on_result(&mut self, status: SearchStatus) {
        if let Some(pending) = self.pending.take() {
            let outcome = match status {
                SearchStatus::Success if self.over_limit => {
                    self.manager.counters.lock().refused += 1;
                    Admission::TooManyRecords
                }
                SearchStatus::Success => {
                    let records = std::mem::take(&mut self.buffered);
                    self.manager.admit(pending, records)
                }
                other => {
                    debug!("Live search ended with {:?}, not caching", other);
                    Admission::Failed(other)
                }
            };
            self.outcome = Some(outcome);
        }
        self.caller.on_result(status);
    }
}

/// Expiry time of a query admitted at `now`; past the calendar's end it never expires
fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl CacheManager {
    /// Store the records of a completed live search and register the query
    pub(crate) fn admit(&self, pending: PendingAdmission, records: Vec<Record>) -> Admission {
        let template_id = pending.template_id;
        let Some(template) = self.templates.get(template_id) else {
            return Admission::NotCacheable;
        };
        let now = self.clock.now();

        if records.is_empty() {
            return match template.negative_ttl {
                Some(ttl) => {
                    let expiry = expiry_after(now, ttl);
                    let cached = self.register(template_id, pending.query, None, now, expiry);
                    debug!("Negative entry {} admitted under template {}", cached.id, template_id);
                    Admission::AdmittedNegative {
                        template_id,
                        query_id: cached.id,
                    }
                }
                None => Admission::EmptyResult,
            };
        }

        // Checked again since the search started; concurrent admissions may
        // still overshoot the limit by a bounded amount
        if !self.has_query_capacity() {
            self.counters.lock().refused += 1;
            return Admission::QueryLimitReached;
        }

        let tag = QueryTag::generate();
        for record in &records {
            let _guard = self.store_guard.write();
            self.evict_while_over_budget();
            match self.store.add(record, &tag) {
                Ok(AddOutcome::Added) => self.counters.lock().cached_records += 1,
                Ok(AddOutcome::Merged) => {}
                Err(e) => warn!("Failed to cache record {}: {}", record.dn, e),
            }
        }

        let expiry = expiry_after(now, template.ttl);
        let cached = self.register(template_id, pending.query, Some(tag), now, expiry);
        debug!(
            "Query {} admitted under template {} with {} records",
            cached.id,
            template_id,
            records.len()
        );
        Admission::Admitted {
            template_id,
            query_id: cached.id,
            records: records.len(),
        }
    }

    /// Link a new cached query into its template chain and the LRU head
    fn register(
        &self,
        template_id: usize,
        query: Query,
        tag: Option<QueryTag>,
        admitted_at: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Arc<CachedQuery> {
        let id = self.next_query_id.fetch_add(1, Ordering::Relaxed);
        let cached = Arc::new(CachedQuery::new(id, template_id, query, tag, admitted_at, expiry));

        {
            let mut chain = self.templates[template_id].chain.write();
            chain.insert(Arc::clone(&cached));
            self.lru.lock().push_front(id, template_id);
        }

        {
            let mut counters = self.counters.lock();
            counters.cached_queries += 1;
            counters.admitted += 1;
        }

        self.sweep.resume();
        cached
    }

    pub(crate) fn has_query_capacity(&self) -> bool {
        self.counters.lock().cached_queries < self.config.max_cached_queries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_saturates_at_calendar_end() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, Duration::seconds(60)), now + Duration::seconds(60));
        assert_eq!(expiry_after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
