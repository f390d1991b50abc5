//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// arrsync - Reconcile *arr services against a declarative document
#[derive(Parser, Debug)]
#[command(name = "arrsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// More output; repeat for debug logs
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Bring every declared service in line with the document
    ///
    /// Exits 0 when every resource reached its desired state, 1 when any
    /// resource failed or a service was skipped, 2 when the document is
    /// invalid.
    Sync(RunArgs),

    /// Show what sync would change, without changing anything
    Plan(RunArgs),

    /// Check the document without contacting any service
    Validate {
        /// Path to the document (.yaml, .yml, .json or .toml)
        document: PathBuf,
    },
}

/// Options shared by `sync` and `plan`
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    /// Path to the document (.yaml, .yml, .json or .toml)
    pub document: PathBuf,

    /// Delete live resources the document does not declare, for every
    /// managed kind
    #[arg(long, conflicts_with = "no_prune")]
    pub prune: bool,

    /// Never delete anything, whatever the document says
    #[arg(long)]
    pub no_prune: bool,

    /// Cancel the run after this many seconds
    #[arg(long, env = "ARRSYNC_TIMEOUT", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Attempts per change, including the first
    #[arg(long, env = "ARRSYNC_MAX_ATTEMPTS", default_value_t = 3, value_name = "N")]
    pub max_attempts: usize,

    /// Timeout for a single HTTP request
    #[arg(long, env = "ARRSYNC_REQUEST_TIMEOUT", default_value_t = 30, value_name = "SECS")]
    pub request_timeout: u64,

    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Prune override requested on the command line, if any
    pub fn prune_override(&self) -> Option<bool> {
        match (self.prune, self.no_prune) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}
