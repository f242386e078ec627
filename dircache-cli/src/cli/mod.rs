// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for DirCache
//!
//! Validates cache configurations and replays search traces through a cache
//! over an in-memory directory.

pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{Cli, Commands};
pub use handlers::{handle_check, handle_replay};
