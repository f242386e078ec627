// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI command handlers for DirCache

use colored::Colorize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::commands::OutputFormat;
use super::output::{ReplayRow, ReportFormatter};
use dircache::{
    CacheConfig, CacheManager, CollectingSink, DefaultSchema, ManualClock, MemoryBackend,
    MemoryStore, Query, Record, Scope, MAX_TTL_SECS,
};

/// One search of a replay trace
#[derive(Debug, Deserialize)]
struct TraceEntry {
    base: String,
    #[serde(default = "default_scope")]
    scope: Scope,
    filter: String,
    #[serde(default)]
    attributes: Vec<String>,
    #[serde(default)]
    attrs_only: bool,
    /// Seconds to move the clock forward before this search
    #[serde(default)]
    advance_secs: i64,
}

fn default_scope() -> Scope {
    Scope::Subtree
}

/// Parse one trace line, rejecting clock moves the cache could not represent
fn parse_trace_entry(line_no: usize, text: &str) -> Result<TraceEntry, String> {
    let entry: TraceEntry =
        serde_json::from_str(text).map_err(|e| format!("Trace line {}: {}", line_no, e))?;
    let in_range = u64::try_from(entry.advance_secs).is_ok_and(|secs| secs <= MAX_TTL_SECS);
    if !in_range {
        return Err(format!(
            "Trace line {}: advance_secs must be between 0 and {}, got {}",
            line_no, MAX_TTL_SECS, entry.advance_secs
        ));
    }
    Ok(entry)
}

/// Load a configuration, picking the format from the file extension
fn load_config(path: &Path) -> Result<CacheConfig, Box<dyn std::error::Error>> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let config = if is_json {
        CacheConfig::from_json_file(path)?
    } else {
        let contents = std::fs::read_to_string(path)?;
        CacheConfig::from_directives(&contents)?
    };
    Ok(config)
}

fn load_directory(path: &Path) -> Result<MemoryBackend, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let entries: Vec<Record> = serde_json::from_str(&contents)
        .map_err(|e| format!("Invalid directory file {:?}: {}", path, e))?;

    let backend = MemoryBackend::new();
    for entry in entries {
        // Rebuild so attribute names are lowercased
        let record = entry
            .attributes
            .iter()
            .fold(Record::new(entry.dn.clone()), |record, (name, values)| {
                record.with_attribute(name, values.iter().cloned())
            });
        backend.insert(record);
    }
    Ok(backend)
}

/// Handle the check command
pub fn handle_check(config: PathBuf, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let cache_config = load_config(&config)
        .map_err(|e| format!("Configuration {:?} rejected: {}", config, e))?;
    let cache = CacheManager::new(cache_config, Arc::new(MemoryStore::new()))?;

    print!("{}", ReportFormatter::format_check(&cache, format));
    if format == OutputFormat::Table {
        println!("{}", "Configuration is valid".green());
    }
    Ok(())
}

/// Handle the replay command
pub fn handle_replay(
    config: PathBuf,
    directory: PathBuf,
    trace: PathBuf,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let cache_config = load_config(&config)
        .map_err(|e| format!("Configuration {:?} rejected: {}", config, e))?;
    let backend = load_directory(&directory)?;
    log::info!("Loaded {} directory entries", backend.len());

    let clock = Arc::new(ManualClock::starting_now());
    let cache = CacheManager::with_components(
        cache_config,
        Arc::new(MemoryStore::new()),
        Arc::new(DefaultSchema::new()),
        clock.clone(),
    )?;

    let contents = std::fs::read_to_string(&trace)?;
    let mut rows = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let entry = parse_trace_entry(line_no, trimmed)?;

        if entry.advance_secs > 0 {
            clock.advance_secs(entry.advance_secs);
            cache.expire_stale();
        }

        let mut query = Query::parse(&entry.base, entry.scope, &entry.filter)
            .map_err(|e| format!("Trace line {}: {}", line_no, e))?
            .with_attrs_only(entry.attrs_only);
        if !entry.attributes.is_empty() {
            query = query.with_attributes(&entry.attributes);
        }

        let mut sink = CollectingSink::new();
        let outcome = cache.search(&query, &backend, &mut sink)?;
        rows.push(ReplayRow {
            line: line_no,
            query: query.to_string(),
            outcome,
            entries: sink.entries.len(),
        });
    }

    print!(
        "{}",
        ReportFormatter::format_replay(&rows, &cache.stats(), format)
    );
    Ok(())
}
