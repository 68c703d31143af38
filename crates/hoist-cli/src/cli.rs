//! CLI argument definitions for hoist.
//!
//! Uses `clap` derive macros to define the command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "hoist",
    version,
    about = "Resolve and fetch Maven-style artifacts",
    long_about = "hoist resolves the transitive dependencies of Maven-style coordinates \
                  and materializes the artifact files into a local, URL-addressed cache."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repository URL, highest priority first (default: Maven Central)
    #[arg(short, long, global = true)]
    pub repository: Vec<String>,

    /// Cache root directory (overrides HOIST_CACHE)
    #[arg(long, global = true)]
    pub cache: Option<String>,

    /// Cache mode tokens: default, update, update-changing, force, missing, offline
    #[arg(long, global = true)]
    pub mode: Option<String>,

    /// Freshness window for changing artifacts, e.g. 24h or 30min
    #[arg(long, global = true)]
    pub ttl: Option<String>,

    /// Number of parallel downloads
    #[arg(long, global = true)]
    pub parallel: Option<usize>,

    /// Fail on version conflicts instead of reconciling
    #[arg(long, global = true)]
    pub strict: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve coordinates and print the resolution report
    Resolve {
        /// Coordinates as org:name:version
        #[arg(required = true)]
        coordinates: Vec<String>,
    },

    /// Resolve coordinates and download all artifact files
    Fetch {
        /// Coordinates as org:name:version
        #[arg(required = true)]
        coordinates: Vec<String>,

        /// Print the resulting files separated by the platform path
        /// separator instead of one per line
        #[arg(long)]
        classpath: bool,
    },

    /// Resolve coordinates and print the dependency tree
    Tree {
        /// Coordinates as org:name:version
        #[arg(required = true)]
        coordinates: Vec<String>,

        /// Maximum tree depth to display
        #[arg(short, long)]
        depth: Option<usize>,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}
