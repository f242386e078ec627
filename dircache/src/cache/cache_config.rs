// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache configuration: attribute sets, templates and limits
//!
//! A configuration can be loaded from JSON or from the line-oriented
//! directive format:
//!
//! ```text
//! proxycache <backend> <max_entries> <numattrsets> <entry_limit> <cc_period>
//! proxyattrset <index> <attr> [<attr> ...]
//! proxytemplate <filter shape> <attrset index> <ttl> [<negative ttl>]
//! proxycachequeries <max_queries>
//! ```

use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::filter::parse_filter;

/// Upper bound on configured attribute sets
pub const MAX_ATTR_SETS: usize = 500;

/// Upper bound on TTLs and the sweep period, one hundred years
pub const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// A named projection attribute list. Empty (or `*`) means all user attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeSetConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl AttributeSetConfig {
    pub fn new<I, S>(name: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }

    /// True when the set stands for every user attribute
    pub fn is_all(&self) -> bool {
        self.attributes.is_empty() || self.attributes.iter().any(|a| a == "*")
    }
}

/// A cacheable query template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Value-free filter shape, e.g. `(&(cn=)(objectclass=))`
    pub filter: String,
    /// Index into `CacheConfig::attribute_sets`
    pub attr_set: usize,
    pub ttl_secs: u64,
    /// Zero disables negative caching for this template
    #[serde(default)]
    pub negative_ttl_secs: u64,
}

impl TemplateConfig {
    pub fn new(filter: &str, attr_set: usize, ttl_secs: u64) -> Self {
        Self {
            filter: filter.to_string(),
            attr_set,
            ttl_secs,
            negative_ttl_secs: 0,
        }
    }

    pub fn with_negative_ttl(mut self, secs: u64) -> Self {
        self.negative_ttl_secs = secs;
        self
    }
}

/// Global cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Name of the backend being cached (informational)
    #[serde(default)]
    pub backend: String,

    #[serde(default)]
    pub attribute_sets: Vec<AttributeSetConfig>,

    #[serde(default)]
    pub templates: Vec<TemplateConfig>,

    /// Upper bound on cached queries across all templates
    #[serde(default = "default_max_cached_queries")]
    pub max_cached_queries: usize,

    /// Upper bound on records held by the store
    #[serde(default = "default_max_cached_records")]
    pub max_cached_records: usize,

    /// Searches returning more records than this are not cached
    #[serde(default = "default_max_records_per_query")]
    pub max_records_per_query: usize,

    /// Interval between expiry sweeps
    #[serde(default = "default_sweep_period_secs")]
    pub sweep_period_secs: u64,
}

fn default_max_cached_queries() -> usize {
    10_000
}

fn default_max_cached_records() -> usize {
    10_000
}

fn default_max_records_per_query() -> usize {
    5
}

fn default_sweep_period_secs() -> u64 {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: String::new(),
            attribute_sets: Vec::new(),
            templates: Vec::new(),
            max_cached_queries: default_max_cached_queries(),
            max_cached_records: default_max_cached_records(),
            max_records_per_query: default_max_records_per_query(),
            sweep_period_secs: default_sweep_period_secs(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute_set(mut self, set: AttributeSetConfig) -> Self {
        self.attribute_sets.push(set);
        self
    }

    pub fn with_template(mut self, template: TemplateConfig) -> Self {
        self.templates.push(template);
        self
    }

    pub fn with_max_cached_queries(mut self, max: usize) -> Self {
        self.max_cached_queries = max;
        self
    }

    pub fn with_max_cached_records(mut self, max: usize) -> Self {
        self.max_cached_records = max;
        self
    }

    pub fn with_max_records_per_query(mut self, max: usize) -> Self {
        self.max_records_per_query = max;
        self
    }

    pub fn with_sweep_period_secs(mut self, secs: u64) -> Self {
        self.sweep_period_secs = secs;
        self
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: CacheConfig = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse the directive format. The result is validated.
    pub fn from_directives(input: &str) -> Result<Self, ConfigError> {
        let mut config = CacheConfig::default();
        let mut declared_sets: Option<usize> = None;

        for (idx, raw_line) in input.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw_line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let args: Vec<&str> = trimmed.split_whitespace().collect();
            let directive = args[0].to_ascii_lowercase();

            match directive.as_str() {
                "proxycache" => {
                    require_args(&args, 6, line, "<backend> <max_entries> <numattrsets> <entry_limit> <cc_period>")?;
                    let num_sets: usize = parse_number(args[3], line)?;
                    if num_sets > MAX_ATTR_SETS {
                        return Err(ConfigError::TooManyAttributeSets {
                            count: num_sets,
                            max: MAX_ATTR_SETS,
                        });
                    }
                    config.backend = args[1].to_string();
                    config.max_cached_records = parse_number(args[2], line)?;
                    config.max_records_per_query = parse_number(args[4], line)?;
                    config.sweep_period_secs = parse_number(args[5], line)?;
                    config.attribute_sets = (0..num_sets)
                        .map(|i| AttributeSetConfig::new(&format!("set{}", i), Vec::<String>::new()))
                        .collect();
                    declared_sets = Some(num_sets);
                }
                "proxyattrset" => {
                    require_args(&args, 3, line, "<index> <attributes>")?;
                    let index: usize = parse_number(args[1], line)?;
                    let count = declared_sets.unwrap_or(0);
                    if index >= count {
                        return Err(ConfigError::AttributeSetIndexOutOfBounds { index, count });
                    }
                    let attributes: Vec<String> = if args[2] == "*" {
                        Vec::new()
                    } else {
                        args[2..].iter().map(|a| a.to_lowercase()).collect()
                    };
                    config.attribute_sets[index].attributes = attributes;
                }
                "proxytemplate" => {
                    if args.len() != 4 && args.len() != 5 {
                        return Err(ConfigError::MissingArguments {
                            line,
                            directive: directive.clone(),
                            expected: "<filter> <proj attr set> <TTL> [<negative TTL>]".to_string(),
                        });
                    }
                    let attr_set: usize = parse_number(args[2], line)?;
                    let count = declared_sets.unwrap_or(0);
                    if attr_set >= count {
                        return Err(ConfigError::AttributeSetIndexOutOfBounds {
                            index: attr_set,
                            count,
                        });
                    }
                    let mut template =
                        TemplateConfig::new(args[1], attr_set, parse_number(args[3], line)?);
                    if let Some(neg) = args.get(4) {
                        template.negative_ttl_secs = parse_number(neg, line)?;
                    }
                    config.templates.push(template);
                }
                "proxycachequeries" => {
                    require_args(&args, 2, line, "<max_queries>")?;
                    config.max_cached_queries = parse_number(args[1], line)?;
                }
                _ => {
                    return Err(ConfigError::UnknownDirective { line, directive });
                }
            }
        }

        config.validate()?;
        debug!(
            "Loaded cache config: {} attribute sets, {} templates",
            config.attribute_sets.len(),
            config.templates.len()
        );
        Ok(config)
    }

    /// Reject configurations the cache cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attribute_sets.len() > MAX_ATTR_SETS {
            return Err(ConfigError::TooManyAttributeSets {
                count: self.attribute_sets.len(),
                max: MAX_ATTR_SETS,
            });
        }

        if self.templates.is_empty() {
            return Err(ConfigError::NoTemplates);
        }

        if self.sweep_period_secs > MAX_TTL_SECS {
            return Err(ConfigError::SweepPeriodOutOfRange {
                value: self.sweep_period_secs,
                max: MAX_TTL_SECS,
            });
        }

        for (idx, template) in self.templates.iter().enumerate() {
            if template.attr_set >= self.attribute_sets.len() {
                return Err(ConfigError::UnknownAttributeSet {
                    template: idx,
                    attr_set: template.attr_set,
                });
            }
            if template.ttl_secs == 0 {
                return Err(ConfigError::NonPositiveTtl { template: idx });
            }
            for value in [template.ttl_secs, template.negative_ttl_secs] {
                if value > MAX_TTL_SECS {
                    return Err(ConfigError::TtlOutOfRange {
                        template: idx,
                        value,
                        max: MAX_TTL_SECS,
                    });
                }
            }
            canonical_shape(&template.filter).map_err(|reason| ConfigError::MalformedShape {
                template: idx,
                shape: template.filter.clone(),
                reason,
            })?;
        }

        Ok(())
    }
}

/// Canonical (case-folded) form of a template shape, or why it is not one
pub fn canonical_shape(shape: &str) -> Result<String, String> {
    let parsed = parse_filter(shape).map_err(|e| e.to_string())?;
    let rendered = parsed.shape();
    if rendered != shape.trim().to_lowercase() {
        return Err(format!("not a value-free shape, expected '{}'", rendered));
    }
    Ok(rendered)
}

fn require_args(args: &[&str], min: usize, line: usize, expected: &str) -> Result<(), ConfigError> {
    if args.len() < min {
        return Err(ConfigError::MissingArguments {
            line,
            directive: args[0].to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(value: &str, line: usize) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| ConfigError::InvalidNumber {
        line,
        value: value.to_string(),
    })
}
