use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "samewise")]
#[command(about = "Find duplicate files and directories by sampled content hashing", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Find exact duplicates under the configured (or given) roots
    Find {
        /// Scan these roots instead of the configured ones
        #[arg(short, long)]
        root: Vec<String>,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fingerprint a single file or directory
    Hash {
        path: String,

        /// Sample window size in bytes; 0 hashes the whole content
        #[arg(short, long, default_value_t = 0)]
        segment_length: u64,
    },
    /// Display the number of rows in the fingerprint cache
    CacheStats,
    /// Delete every row of the fingerprint cache
    ClearCache,
    /// Print configuration values
    PrintConfig,
}
