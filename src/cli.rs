//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cache maintenance tool for stagehand pipelines
#[derive(Parser, Debug)]
#[command(name = "stagehand")]
#[command(version)]
#[command(about = "Inspect and maintain stagehand cache directories", long_about = None)]
pub struct Cli {
    /// Cache directory to operate on
    #[arg(
        short = 'C',
        long = "cache-dir",
        value_name = "DIR",
        default_value = ".stagehand"
    )]
    pub cache_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the cache entries currently present
    List {
        /// Output the inventory as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pretty-print the state snapshot stored for a fingerprint
    Show {
        /// Fingerprint of the entry to display (the cache file stem)
        #[arg(value_name = "FINGERPRINT")]
        fingerprint: String,
    },
    /// Delete every cache entry in the directory
    Clear,
}
