// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use skriv_config::Mode;

#[derive(Parser, Debug)]
#[command(
    name = "skriv",
    about = "A multi-user chat-to-knowledge-base ingestion agent",
    version
)]
pub struct Cli {
    /// Path to an explicit config file (merged over the discovered layers)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Log to stderr (RUST_LOG controls the filter; defaults to info)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the ingestion core against the console transport.
    ///
    /// Reads messages from stdin as `<user_id> <text>` lines and prints
    /// outbound messages to stdout.  The real chat transport plugs in at
    /// the same port.
    Run {
        /// Start every user in this mode instead of the configured default
        #[arg(long, value_enum)]
        mode: Option<Mode>,
    },

    /// Validate the configuration and exit.
    ///
    /// Exit code 0 when the merged configuration is valid, 2 otherwise.
    CheckConfig,

    /// Print the merged configuration and exit.
    ShowConfig,
}
