// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Command line arguments

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dircache")]
#[command(author, version, about = "Directory search result cache tools", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<log::Level>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print version information
    Version,

    /// Validate a cache configuration and list its templates
    Check {
        /// Configuration file (`.json`, otherwise the directive format)
        config: PathBuf,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Drive a search trace through the cache and report hits and misses
    Replay {
        /// Configuration file (`.json`, otherwise the directive format)
        config: PathBuf,

        /// Directory entries as a JSON array of `{"dn", "attributes"}` objects
        #[arg(short, long)]
        directory: PathBuf,

        /// Search trace, one JSON object per line
        trace: PathBuf,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}
