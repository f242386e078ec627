// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Size-based LRU eviction and tag-based record removal
//!
//! Whoever unlinks a cached query from its template chain owns its cleanup:
//! removing its tag from the store and adjusting the counters.

use log::{debug, warn};

use super::cache_manager::CacheManager;
use super::template::CachedQuery;
use crate::store::QueryTag;

impl CacheManager {
    /// Evict least recently used queries until the record count is within
    /// budget. The caller holds the store guard exclusively.
    pub(crate) fn evict_while_over_budget(&self) -> usize {
        let mut evicted = 0;

        loop {
            if self.counters.lock().cached_records <= self.config.max_cached_records {
                break;
            }

            let popped = self.lru.lock().pop_back();
            let Some((query_id, template_id)) = popped else {
                break;
            };

            let removed = self
                .templates
                .get(template_id)
                .and_then(|template| template.chain.write().remove(query_id));

            // Already unlinked by a concurrent sweep, which owns the cleanup
            let Some(cached) = removed else {
                continue;
            };

            debug!("Evicting query {} from template {}", cached.id, template_id);
            self.release(&cached);
            self.counters.lock().lru_evictions += 1;
            evicted += 1;
        }

        evicted
    }

    /// Drop the store data of a query that has left its chain and update the
    /// counters. The caller holds the store guard exclusively.
    pub(crate) fn release(&self, cached: &CachedQuery) {
        let removed = match &cached.tag {
            Some(tag) => self.remove_tagged_records(tag),
            None => 0,
        };

        let mut counters = self.counters.lock();
        counters.cached_records = counters.cached_records.saturating_sub(removed);
        counters.cached_queries = counters.cached_queries.saturating_sub(1);
    }

    /// Strip `tag` from every record carrying it, deleting records left
    /// without tags. Returns the number of deleted records.
    ///
    /// Store failures are logged and skipped; the removal is best effort.
    pub(crate) fn remove_tagged_records(&self, tag: &QueryTag) -> usize {
        let tagged = match self.store.find_by_tag(tag) {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to look up records for tag {}: {}", tag, e);
                return 0;
            }
        };

        let mut deleted = 0;
        for stored in tagged {
            let dn = &stored.record.dn;
            let mut remaining = stored.tags.clone();
            remaining.remove(tag);

            if remaining.is_empty() {
                match self.store.delete_by_key(dn) {
                    Ok(()) => deleted += 1,
                    Err(e) => warn!("Failed to delete cached record {}: {}", dn, e),
                }
            } else if let Err(e) = self.store.update_tags(dn, remaining) {
                warn!("Failed to untag cached record {}: {}", dn, e);
            }
        }

        debug!("Removed tag {}: {} records deleted", tag, deleted);
        deleted
    }
}
