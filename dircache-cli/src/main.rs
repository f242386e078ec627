// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! DirCache CLI entry point

use clap::Parser;
use colored::Colorize;

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if let Some(level) = cli.log_level {
        level.to_level_filter()
    } else {
        // RUST_LOG can still raise it
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    match cli.command {
        Commands::Version => {
            println!("{} {}", "DirCache".bold().green(), dircache::VERSION);
            println!("Directory search result cache");
            Ok(())
        }

        Commands::Check { config, format } => cli::handle_check(config, format),

        Commands::Replay {
            config,
            directory,
            trace,
            format,
        } => cli::handle_replay(config, directory, trace, format),
    }
}
