// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Central cache management and coordination
//!
//! Locking order, outermost first: store guard, template chain, LRU list.
//! The counters mutex is a leaf and is never held while taking another lock.

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use super::attr_set::AttributeSetRegistry;
use super::cache_config::{canonical_shape, CacheConfig};
use super::classifier::{self, Classification};
use super::clock::{Clock, SystemClock};
use super::containment;
use super::lru::LruList;
use super::populator::{Admission, PendingAdmission, ResponseCollector};
use super::sweeper::SweepControl;
use super::template::{CachedQuery, QueryId, QueryTemplate};
use crate::backend::{SearchBackend, SearchSink, SearchStatus};
use crate::error::{CacheResult, ConfigError};
use crate::query::Query;
use crate::schema::{AttributeSchema, DefaultSchema};
use crate::store::RecordStore;

/// Result of a search routed through the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Answered from the store
    Hit {
        template_id: usize,
        query_id: QueryId,
        entries: usize,
    },
    /// Answered empty from a negative entry
    NegativeHit { template_id: usize, query_id: QueryId },
    /// Executed against the backend
    Live(Admission),
}

impl SearchOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, SearchOutcome::Hit { .. } | SearchOutcome::NegativeHit { .. })
    }

    /// Id of the cached query that answered or was created
    pub fn query_id(&self) -> Option<QueryId> {
        match self {
            SearchOutcome::Hit { query_id, .. } | SearchOutcome::NegativeHit { query_id, .. } => {
                Some(*query_id)
            }
            SearchOutcome::Live(Admission::Admitted { query_id, .. })
            | SearchOutcome::Live(Admission::AdmittedNegative { query_id, .. }) => Some(*query_id),
            SearchOutcome::Live(_) => None,
        }
    }
}

/// Running counters, guarded by one mutex
#[derive(Debug, Default, Clone)]
pub(crate) struct CacheCounters {
    pub cached_queries: usize,
    pub cached_records: usize,
    pub hits: u64,
    pub negative_hits: u64,
    pub misses: u64,
    pub admitted: u64,
    pub refused: u64,
    pub lru_evictions: u64,
    pub expired: u64,
}

/// Snapshot of cache statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct CacheStats {
    pub cached_queries: usize,
    pub cached_records: usize,
    pub hits: u64,
    pub negative_hits: u64,
    pub misses: u64,
    pub admitted: u64,
    pub refused: u64,
    pub lru_evictions: u64,
    pub expired: u64,
    /// Chain length per template
    pub template_queries: Vec<usize>,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits + self.negative_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Description of a configured template
#[derive(Debug, Clone, Serialize)]
pub struct TemplateSummary {
    pub id: usize,
    pub shape: String,
    pub attr_set: usize,
    pub attr_set_name: String,
    pub ttl_secs: i64,
    pub negative_ttl_secs: Option<i64>,
    pub cached_queries: usize,
}

/// The query cache
pub struct CacheManager {
    pub(crate) config: CacheConfig,
    pub(crate) schema: Arc<dyn AttributeSchema>,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) attr_sets: AttributeSetRegistry,
    pub(crate) templates: Vec<QueryTemplate>,
    pub(crate) lru: Mutex<LruList>,
    pub(crate) counters: Mutex<CacheCounters>,
    /// Shared while a hit reads the store, exclusive while records are
    /// merged in or removed
    pub(crate) store_guard: RwLock<()>,
    pub(crate) next_query_id: AtomicU64,
    pub(crate) sweep: Arc<SweepControl>,
}

impl CacheManager {
    /// Cache with the default schema and the system clock
    pub fn new(config: CacheConfig, store: Arc<dyn RecordStore>) -> CacheResult<Self> {
        Self::with_components(
            config,
            store,
            Arc::new(DefaultSchema::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn with_components(
        config: CacheConfig,
        store: Arc<dyn RecordStore>,
        schema: Arc<dyn AttributeSchema>,
        clock: Arc<dyn Clock>,
    ) -> CacheResult<Self> {
        config.validate()?;

        let attr_sets = AttributeSetRegistry::new(&config.attribute_sets, &config.templates);
        let templates = config
            .templates
            .iter()
            .enumerate()
            .map(|(id, template)| {
                let shape = canonical_shape(&template.filter).map_err(|reason| {
                    ConfigError::MalformedShape {
                        template: id,
                        shape: template.filter.clone(),
                        reason,
                    }
                })?;
                debug!("Template {}: {} on attribute set {}", id, shape, template.attr_set);
                Ok(QueryTemplate::new(
                    id,
                    shape,
                    template.attr_set,
                    template.ttl_secs,
                    template.negative_ttl_secs,
                ))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        for set in attr_sets.iter().filter(|s| !s.referenced) {
            debug!("Attribute set {} is not used by any template", set.name);
        }

        // Records left by an earlier run have no owning query and would never
        // be evicted, yet lookups would return them
        let leftover = store.len()?;
        if leftover > 0 {
            warn!("Discarding {} records left in the store by an earlier run", leftover);
            store.clear()?;
        }

        info!(
            "Query cache ready: {} templates, {} attribute sets, {} max records",
            templates.len(),
            attr_sets.len(),
            config.max_cached_records
        );

        Ok(Self {
            config,
            schema,
            store,
            clock,
            attr_sets,
            templates,
            lru: Mutex::new(LruList::new()),
            counters: Mutex::new(CacheCounters::default()),
            store_guard: RwLock::new(()),
            next_query_id: AtomicU64::new(1),
            sweep: Arc::new(SweepControl::default()),
        })
    }

    /// Route a search through the cache.
    ///
    /// Answers from a containing cached query when one exists, otherwise runs
    /// the search on `backend` and admits the result when the query is
    /// cacheable. Either way `sink` receives the entries and a final status.
    pub fn search(
        &self,
        query: &Query,
        backend: &dyn SearchBackend,
        sink: &mut dyn SearchSink,
    ) -> CacheResult<SearchOutcome> {
        let classification = self.classify(query);

        if let Some(classification) = &classification {
            for &template_id in &classification.candidates {
                let Some(cached) = self.lookup(query, template_id) else {
                    continue;
                };
                if let Some(outcome) = self.answer_from_cache(query, &cached, sink) {
                    return Ok(outcome);
                }
            }
        }

        self.counters.lock().misses += 1;
        debug!("Cache miss: {}", query);

        let pending = match self.plan_admission(query, classification.as_ref()) {
            Ok(pending) => pending,
            Err(refusal) => {
                debug!("Not caching {}: {:?}", query, refusal);
                backend.search(query, sink)?;
                return Ok(SearchOutcome::Live(refusal));
            }
        };

        let live_query = pending.live_query.clone();
        let mut collector = ResponseCollector::new(self, pending, sink);
        backend.search(&live_query, &mut collector)?;
        Ok(SearchOutcome::Live(collector.finish()))
    }

    /// Template classification of a search
    pub fn classify(&self, query: &Query) -> Option<Classification> {
        let classification = classifier::classify(query, &self.attr_sets, &self.templates);
        match &classification {
            Some(c) => debug!(
                "Classified {} as {} on attribute set {}, candidates {:?}",
                query, c.shape, c.attr_set, c.candidates
            ),
            None => debug!("No template for {}", query),
        }
        classification
    }

    /// Newest unexpired cached query of `template_id` that contains `query`.
    /// A match is promoted to the head of the LRU list.
    pub fn lookup(&self, query: &Query, template_id: usize) -> Option<Arc<CachedQuery>> {
        let template = self.templates.get(template_id)?;
        let now = self.clock.now();
        let chain = template.chain.read();

        for cached in chain.newest_first() {
            if cached.is_expired(now) {
                continue;
            }
            if !containment::query_contains(&cached.query, query, self.schema.as_ref()).is_contained() {
                continue;
            }
            // Not in the list means an eviction is removing it right now
            if self.lru.lock().promote(cached.id) {
                debug!("Query {} answers {}", cached.id, query);
                return Some(Arc::clone(cached));
            }
        }

        None
    }

    /// Serve `query` from the store on behalf of `cached`. `None` when the
    /// cached query was retired before the store could be read.
    fn answer_from_cache(
        &self,
        query: &Query,
        cached: &CachedQuery,
        sink: &mut dyn SearchSink,
    ) -> Option<SearchOutcome> {
        if cached.is_negative() {
            self.counters.lock().negative_hits += 1;
            sink.on_result(SearchStatus::Success);
            return Some(SearchOutcome::NegativeHit {
                template_id: cached.template_id,
                query_id: cached.id,
            });
        }

        let _guard = self.store_guard.read();
        if cached.is_retired() {
            debug!("Query {} retired before it could answer", cached.id);
            return None;
        }

        let records = match self.store.find_by_filter(
            &query.base,
            query.scope,
            &query.filter,
            self.schema.as_ref(),
        ) {
            Ok(records) => records,
            Err(e) => {
                warn!("Store lookup failed, answering live: {}", e);
                return None;
            }
        };

        for record in &records {
            let projected = record.project(&query.attributes, self.schema.as_ref(), query.attrs_only);
            sink.on_entry(&projected);
        }
        sink.on_result(SearchStatus::Success);

        self.counters.lock().hits += 1;
        Some(SearchOutcome::Hit {
            template_id: cached.template_id,
            query_id: cached.id,
            entries: records.len(),
        })
    }

    fn plan_admission(
        &self,
        query: &Query,
        classification: Option<&Classification>,
    ) -> Result<PendingAdmission, Admission> {
        let (classification, template_id) = match classification {
            Some(c) => match c.admission_template {
                Some(template_id) => (c, template_id),
                None => return Err(Admission::NotCacheable),
            },
            None => return Err(Admission::NotCacheable),
        };

        if query.attrs_only {
            self.counters.lock().refused += 1;
            return Err(Admission::AttrsOnly);
        }
        if !self.has_query_capacity() {
            self.counters.lock().refused += 1;
            return Err(Admission::QueryLimitReached);
        }

        let mut live_query = query.clone();
        live_query.attributes = query
            .attributes
            .widened(&classification.filter_attributes, self.schema.as_ref());

        Ok(PendingAdmission {
            template_id,
            query: query.clone(),
            live_query,
        })
    }

    /// Drop every cached query and its records
    pub fn clear(&self) {
        let mut drained = Vec::new();
        for template in &self.templates {
            let queries = template.chain.write().drain();
            let mut lru = self.lru.lock();
            for cached in &queries {
                lru.unlink(cached.id);
            }
            drained.extend(queries);
        }

        let _guard = self.store_guard.write();
        for cached in &drained {
            self.release(cached);
        }
        info!("Cache cleared, {} queries dropped", drained.len());
    }

    pub fn stats(&self) -> CacheStats {
        let template_queries = self.templates.iter().map(|t| t.cached_queries()).collect();
        let counters = self.counters.lock().clone();
        CacheStats {
            cached_queries: counters.cached_queries,
            cached_records: counters.cached_records,
            hits: counters.hits,
            negative_hits: counters.negative_hits,
            misses: counters.misses,
            admitted: counters.admitted,
            refused: counters.refused,
            lru_evictions: counters.lru_evictions,
            expired: counters.expired,
            template_queries,
        }
    }

    pub fn template_summaries(&self) -> Vec<TemplateSummary> {
        self.templates
            .iter()
            .map(|t| TemplateSummary {
                id: t.id,
                shape: t.shape.clone(),
                attr_set: t.attr_set,
                attr_set_name: self
                    .attr_sets
                    .get(t.attr_set)
                    .map(|s| s.name.clone())
                    .unwrap_or_default(),
                ttl_secs: t.ttl.num_seconds(),
                negative_ttl_secs: t.negative_ttl.map(|d| d.num_seconds()),
                cached_queries: t.cached_queries(),
            })
            .collect()
    }

    /// Whether a cached query is still linked into its template
    pub fn is_cached(&self, query_id: QueryId) -> bool {
        self.templates
            .iter()
            .any(|t| t.chain.read().contains(query_id))
    }

    /// Cached query ids from most to least recently used
    pub fn lru_order(&self) -> Vec<QueryId> {
        self.lru.lock().order()
    }

    /// Whether the sweep worker is paused waiting for an admission
    pub fn is_sweeper_paused(&self) -> bool {
        self.sweep.is_paused()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn attribute_sets(&self) -> &AttributeSetRegistry {
        &self.attr_sets
    }

    pub fn templates(&self) -> &[QueryTemplate] {
        &self.templates
    }

    pub fn schema(&self) -> &Arc<dyn AttributeSchema> {
        &self.schema
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }
}
