// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Semantic query cache
//!
//! This module provides:
//! - Template classification of incoming searches
//! - Containment checking against cached searches
//! - Admission of live results into the record store
//! - LRU eviction across templates and TTL expiry sweeps

pub mod attr_set;
pub mod cache_config;
pub mod cache_manager;
pub mod classifier;
pub mod clock;
pub mod containment;
pub mod eviction;
pub mod lru;
pub mod populator;
pub mod sweeper;
pub mod template;

pub use attr_set::{AttributeSet, AttributeSetRegistry};
pub use cache_config::{AttributeSetConfig, CacheConfig, TemplateConfig, MAX_TTL_SECS};
pub use cache_manager::{CacheManager, CacheStats, SearchOutcome, TemplateSummary};
pub use classifier::Classification;
pub use clock::{Clock, ManualClock, SystemClock};
pub use containment::Containment;
pub use populator::Admission;
pub use sweeper::{SweepHandle, SweepReport};
pub use template::{CachedQuery, QueryId, QueryTemplate};
