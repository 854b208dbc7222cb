//! Command-line parsing for the macro dashboard ETL.
//!
//! Argument parsing and command dispatch stay separate from the fetch, store
//! and dashboard code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::GapPolicy;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "macrodash", version, about = "FRED macro series to a versioned dashboard workbook")]
pub struct Cli {
    /// Run configuration (TOML).
    #[arg(long, global = true, default_value = "macrodash.toml")]
    pub config: PathBuf,

    /// Log filter, e.g. `info` or `macrodash=debug`. `MACRODASH_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch, store, then write a new dashboard version (the default).
    Update(FetchArgs),
    /// Fetch and store only.
    Fetch(FetchArgs),
    /// Write a new dashboard version from the stored datasets.
    Dashboard,
    /// Summarize the stored datasets.
    Status,
    /// List dashboard versions.
    Versions,
    /// Print one dashboard version.
    Show(ShowArgs),
}

/// Options shared by `update` and `fetch`.
#[derive(Debug, Args, Clone)]
pub struct FetchArgs {
    /// Override the configured gap policy.
    #[arg(long, value_enum)]
    pub gap_policy: Option<GapPolicy>,

    /// Parallel fetch workers.
    #[arg(short = 'j', long, default_value_t = 1)]
    pub jobs: usize,

    /// Refetch full histories instead of only new observations.
    #[arg(long)]
    pub full: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    /// Version id, or `current`.
    #[arg(default_value = "current")]
    pub version: String,
}
