//! Bulk execution command definitions

pub mod handler;

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Subcommand)]
pub enum BulkCommands {
    /// Execute a file of operations against an environment
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON file containing the operations to execute
    #[arg(long, short = 'f')]
    pub file: PathBuf,

    /// Environment URL (e.g. https://yourorg.crm.dynamics.com)
    #[arg(long)]
    pub url: String,

    /// Name of the environment variable holding the access token
    #[arg(long, default_value = "DATAVERSE_TOKEN")]
    pub token_env: String,

    /// Additional attempts after the first, per operation
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Base delay before the first retry, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub initial_backoff_ms: u64,

    /// Maximum operations per $batch call
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u16).range(1..=1000))]
    pub batch_size: u16,

    /// Maximum $batch calls in flight at once
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..))]
    pub concurrency: u8,

    /// Deadline for a single $batch round trip, in seconds
    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,

    /// Write a JSON report of every outcome to this path
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}
