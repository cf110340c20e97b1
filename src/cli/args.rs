//! Command line argument parsing for the Stratum CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Stratum - a segment-based inverted index
#[derive(Parser, Debug, Clone)]
#[command(name = "stratum")]
#[command(about = "Build and maintain segment-based inverted indexes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct StratumArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl StratumArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Index a text file or every .txt file under a directory
    Index(IndexArgs),

    /// Merge an index into a single segment
    Optimize(OptimizeArgs),

    /// Show index statistics
    Stats(StatsArgs),

    /// Delete the documents containing a term
    Delete(DeleteArgs),

    /// Merge other indexes into an index
    #[command(name = "add-indexes")]
    AddIndexes(AddIndexesArgs),
}

/// Arguments for bulk indexing
#[derive(Parser, Debug, Clone)]
pub struct IndexArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// File or directory tree to index
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Start a new index, discarding the existing segment list
    #[arg(short, long)]
    pub create: bool,

    /// Index writer configuration file (JSON)
    #[arg(long, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Override the merge factor
    #[arg(short, long)]
    pub merge_factor: Option<u32>,

    /// Skip the final optimize
    #[arg(long)]
    pub no_optimize: bool,
}

/// Arguments for index optimization
#[derive(Parser, Debug, Clone)]
pub struct OptimizeArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,
}

/// Arguments for index statistics
#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Include per-field term counts
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for deleting documents
#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Field of the term
    #[arg(value_name = "FIELD")]
    pub field: String,

    /// Text of the term
    #[arg(value_name = "TEXT")]
    pub text: String,
}

/// Arguments for merging indexes
#[derive(Parser, Debug, Clone)]
pub struct AddIndexesArgs {
    /// Path to the target index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Index directories to merge in
    #[arg(value_name = "SOURCE", required = true)]
    pub sources: Vec<PathBuf>,
}

/// Output formats for CLI
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
