//! Cache fixture: a `CacheManager` over an in-memory directory
//!
//! The clock is manual so TTL behaviour can be driven without sleeping.

use std::sync::Arc;

use dircache::{
    CacheConfig, CacheManager, CollectingSink, DefaultSchema, ManualClock, MemoryBackend,
    MemoryStore, Query, RecordStore, Scope, SearchOutcome,
};

use super::sample_data;

pub struct CacheFixture {
    pub cache: Arc<CacheManager>,
    pub backend: MemoryBackend,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl CacheFixture {
    /// Sample people directory with the sample configuration
    pub fn new() -> Self {
        Self::with_config(sample_data::people_config())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self::with_backend(config, sample_data::people_directory())
    }

    pub fn with_backend(config: CacheConfig, backend: MemoryBackend) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let cache = CacheManager::with_components(
            config,
            store.clone(),
            Arc::new(DefaultSchema::new()),
            clock.clone(),
        )
        .expect("Failed to create cache");

        Self {
            cache: Arc::new(cache),
            backend,
            store,
            clock,
        }
    }

    /// Run a search through the cache and collect what the caller receives
    pub fn search(&self, query: &Query) -> (SearchOutcome, CollectingSink) {
        let mut sink = CollectingSink::new();
        let outcome = self
            .cache
            .search(query, &self.backend, &mut sink)
            .expect("Search failed");
        (outcome, sink)
    }

    /// Subtree search under the people container
    pub fn people_query(filter: &str) -> Query {
        Query::parse(sample_data::PEOPLE_BASE, Scope::Subtree, filter).expect("Invalid query")
    }

    pub fn stored_records(&self) -> usize {
        self.store.len().expect("Store length failed")
    }
}
