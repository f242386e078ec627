// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Report formatting for CLI output

use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use serde::Serialize;

use super::commands::OutputFormat;
use dircache::{Admission, CacheManager, CacheStats, SearchOutcome};

/// Result of one replayed search
#[derive(Debug)]
pub struct ReplayRow {
    pub line: usize,
    pub query: String,
    pub outcome: SearchOutcome,
    pub entries: usize,
}

#[derive(Serialize)]
struct ReplayRowJson<'a> {
    line: usize,
    query: &'a str,
    outcome: &'static str,
    query_id: Option<u64>,
    entries: usize,
}

pub struct ReportFormatter;

impl ReportFormatter {
    /// Templates and attribute sets of a validated configuration
    pub fn format_check(cache: &CacheManager, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::check_table(cache),
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "status": "valid",
                    "config": cache.config(),
                    "templates": cache.template_summaries(),
                });
                Self::to_pretty_json(&json)
            }
        }
    }

    fn check_table(cache: &CacheManager) -> String {
        let config = cache.config();
        let mut output = String::new();

        output.push_str(&format!("{}\n", "Cache Configuration".bold().green()));
        output.push_str(&format!("Backend: {}\n", config.backend));
        output.push_str(&format!(
            "Limits: {} queries, {} records, {} records per query\n",
            config.max_cached_queries, config.max_cached_records, config.max_records_per_query
        ));
        output.push_str(&format!("Sweep period: {} s\n\n", config.sweep_period_secs));

        let mut sets = Table::new();
        sets.load_preset(UTF8_FULL);
        sets.set_header(
            ["Set", "Name", "Attributes", "Supersets"]
                .iter()
                .map(|h| Cell::new(h).fg(Color::Green)),
        );
        for (idx, set) in cache.attribute_sets().iter().enumerate() {
            let attributes = match &set.attributes {
                Some(attrs) => attrs.join(" "),
                None => "*".to_string(),
            };
            let supersets: Vec<String> = set.supersets.iter().map(|s| s.to_string()).collect();
            let name = if set.referenced {
                set.name.normal()
            } else {
                set.name.dimmed()
            };
            sets.add_row(vec![
                idx.to_string(),
                name.to_string(),
                attributes,
                supersets.join(", "),
            ]);
        }
        output.push_str(&sets.to_string());
        output.push_str("\n\n");

        let mut templates = Table::new();
        templates.load_preset(UTF8_FULL);
        templates.set_header(
            ["Template", "Shape", "Attribute set", "TTL", "Negative TTL"]
                .iter()
                .map(|h| Cell::new(h).fg(Color::Green)),
        );
        for summary in cache.template_summaries() {
            templates.add_row(vec![
                summary.id.to_string(),
                summary.shape,
                format!("{} ({})", summary.attr_set, summary.attr_set_name),
                format!("{} s", summary.ttl_secs),
                summary
                    .negative_ttl_secs
                    .map(|s| format!("{} s", s))
                    .unwrap_or_else(|| "-".to_string()),
            ]);
        }
        output.push_str(&templates.to_string());
        output.push('\n');
        output
    }

    /// Per-search outcomes followed by the final statistics
    pub fn format_replay(rows: &[ReplayRow], stats: &CacheStats, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::replay_table(rows, stats),
            OutputFormat::Json => {
                let rows: Vec<ReplayRowJson> = rows
                    .iter()
                    .map(|row| ReplayRowJson {
                        line: row.line,
                        query: &row.query,
                        outcome: Self::outcome_label(&row.outcome),
                        query_id: row.outcome.query_id(),
                        entries: row.entries,
                    })
                    .collect();
                let json = serde_json::json!({
                    "searches": rows,
                    "stats": stats,
                    "hit_rate": stats.hit_rate(),
                });
                Self::to_pretty_json(&json)
            }
        }
    }

    fn replay_table(rows: &[ReplayRow], stats: &CacheStats) -> String {
        if rows.is_empty() {
            return format!("{}\n", "Trace contained no searches".yellow());
        }

        let mut output = String::new();
        output.push_str(&format!("{}\n", "Replay Results".bold().green()));

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(
            ["Line", "Search", "Outcome", "Entries"]
                .iter()
                .map(|h| Cell::new(h).fg(Color::Green)),
        );
        for row in rows {
            let label = Self::outcome_label(&row.outcome);
            let color = match &row.outcome {
                SearchOutcome::Hit { .. } | SearchOutcome::NegativeHit { .. } => Color::Green,
                SearchOutcome::Live(admission) if admission.is_admitted() => Color::Cyan,
                SearchOutcome::Live(_) => Color::Yellow,
            };
            table.add_row(vec![
                Cell::new(row.line),
                Cell::new(&row.query),
                Cell::new(label).fg(color),
                Cell::new(row.entries),
            ]);
        }
        output.push_str(&table.to_string());
        output.push_str("\n\n");

        let mut summary = Table::new();
        summary.load_preset(UTF8_FULL);
        summary.set_header(vec![
            Cell::new("Statistic").fg(Color::Green),
            Cell::new("Value").fg(Color::Green),
        ]);
        let lines: [(&str, String); 10] = [
            ("Hits", stats.hits.to_string()),
            ("Negative hits", stats.negative_hits.to_string()),
            ("Misses", stats.misses.to_string()),
            ("Hit rate", format!("{:.1}%", stats.hit_rate() * 100.0)),
            ("Admitted", stats.admitted.to_string()),
            ("Refused", stats.refused.to_string()),
            ("LRU evictions", stats.lru_evictions.to_string()),
            ("Expired", stats.expired.to_string()),
            ("Cached queries", stats.cached_queries.to_string()),
            ("Cached records", stats.cached_records.to_string()),
        ];
        for (name, value) in lines {
            summary.add_row(vec![name.to_string(), value]);
        }
        output.push_str(&summary.to_string());
        output.push('\n');
        output
    }

    fn outcome_label(outcome: &SearchOutcome) -> &'static str {
        match outcome {
            SearchOutcome::Hit { .. } => "hit",
            SearchOutcome::NegativeHit { .. } => "negative hit",
            SearchOutcome::Live(admission) => match admission {
                Admission::Admitted { .. } => "miss, admitted",
                Admission::AdmittedNegative { .. } => "miss, admitted negative",
                Admission::NotCacheable => "miss, no template",
                Admission::AttrsOnly => "miss, attrs only",
                Admission::QueryLimitReached => "miss, query limit",
                Admission::TooManyRecords => "miss, too many records",
                Admission::EmptyResult => "miss, empty",
                Admission::Failed(_) => "miss, failed",
                Admission::Incomplete => "miss, incomplete",
            },
        }
    }

    fn to_pretty_json(value: &serde_json::Value) -> String {
        let mut json = serde_json::to_string_pretty(value).unwrap_or_else(|_| {
            "{\"status\": \"error\", \"error\": \"Could not serialize report\"}".to_string()
        });
        json.push('\n');
        json
    }
}
