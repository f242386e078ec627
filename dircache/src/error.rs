// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Error types for the query cache

use thiserror::Error;

/// Configuration errors. All of them are fatal at load time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("line {line}: missing arguments for '{directive}': expected {expected}")]
    MissingArguments {
        line: usize,
        directive: String,
        expected: String,
    },

    #[error("line {line}: unknown directive '{directive}'")]
    UnknownDirective { line: usize, directive: String },

    #[error("line {line}: invalid number '{value}'")]
    InvalidNumber { line: usize, value: String },

    #[error("attribute set index {index} out of bounds ({count} sets declared)")]
    AttributeSetIndexOutOfBounds { index: usize, count: usize },

    #[error("number of attribute sets ({count}) exceeds the maximum of {max}")]
    TooManyAttributeSets { count: usize, max: usize },

    #[error("template {template} references unknown attribute set {attr_set}")]
    UnknownAttributeSet { template: usize, attr_set: usize },

    #[error("template {template} has a malformed filter shape '{shape}': {reason}")]
    MalformedShape {
        template: usize,
        shape: String,
        reason: String,
    },

    #[error("template {template} must have a positive TTL")]
    NonPositiveTtl { template: usize },

    #[error("template {template}: TTL {value} exceeds the maximum of {max} seconds")]
    TtlOutOfRange { template: usize, value: u64, max: u64 },

    #[error("sweep period {value} exceeds the maximum of {max} seconds")]
    SweepPeriodOutOfRange { value: u64, max: u64 },

    #[error("no query templates configured")]
    NoTemplates,

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Json(err.to_string())
    }
}

/// Search filter parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid filter '{input}': {reason}")]
    Parse { input: String, reason: String },

    #[error("unexpected trailing input '{0}' after filter")]
    TrailingInput(String),

    #[error("invalid distinguished name '{0}'")]
    InvalidDn(String),
}

/// Matching rule failures during value comparison
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("attribute '{attribute}' has no {kind} matching rule")]
    NoMatchingRule { attribute: String, kind: &'static str },

    #[error("value '{value}' is not valid for matching rule {rule}")]
    InvalidValue { rule: &'static str, value: String },
}

/// Record store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(feature = "sled-backend")]
impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Top level cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("sweeper error: {0}")]
    Sweeper(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
pub type StoreResult<T> = Result<T, StoreError>;
