// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! DirCache - a directory search result cache with answerability checking
//!
//! DirCache sits in front of a live directory backend. Every incoming search
//! (filter + base DN + scope + requested attributes) is classified against a set
//! of configured query templates; if a previously cached search provably contains
//! the new one, the answer is served from the local record store, otherwise the
//! search runs live and its results are captured for reuse.
//!
//! # Features
//!
//! - **Template classification**: filters are reduced to value-free shapes and
//!   matched, together with the requested attribute set, against templates
//! - **Containment checking**: base/scope subsumption plus per-operator value
//!   comparison over equality, ordering, substring and presence assertions
//! - **LRU + TTL eviction**: a global recency list across all templates and a
//!   background expiry sweep with pause/resume
//! - **Tagged records**: stored records carry the tags of the cached queries
//!   that own them, so eviction never drops records still shared
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use dircache::{CacheConfig, CacheManager, MemoryStore, Query, Scope};
//!
//! let config = CacheConfig::from_directives(CONFIG_TEXT)?;
//! let store = Arc::new(MemoryStore::new());
//! let cache = Arc::new(CacheManager::new(config, store)?);
//! let sweeper = cache.start_sweeper()?;
//!
//! let query = Query::parse("ou=people,dc=example", Scope::Subtree, "(cn=alice)")?;
//! let outcome = cache.search(&query, &backend, &mut sink)?;
//! ```

pub mod backend;
pub mod cache;
pub mod dn;
pub mod error;
pub mod filter;
pub mod query;
pub mod schema;
pub mod store;

pub use backend::{CollectingSink, MemoryBackend, SearchBackend, SearchSink, SearchStatus};
pub use cache::{
    Admission, AttributeSetConfig, CacheConfig, CacheManager, CacheStats, Classification, Clock,
    Containment, ManualClock, SearchOutcome, SweepHandle, SweepReport, SystemClock,
    TemplateConfig, MAX_TTL_SECS,
};
pub use dn::Dn;
pub use error::{CacheError, CacheResult, ConfigError, FilterError, MatchError, StoreError};
pub use filter::Filter;
pub use query::{AttributeSelection, Query, Scope};
pub use schema::{AttributeSchema, DefaultSchema, MatchingRule};
pub use store::{MemoryStore, QueryTag, Record, RecordStore, StoredRecord};

#[cfg(feature = "sled-backend")]
pub use store::SledStore;

/// DirCache version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// DirCache crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
