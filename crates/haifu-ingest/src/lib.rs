//! haifu ingest library
//!
//! Resumable, idempotent mirror of a remote game-log corpus.
//!
//! # Stages
//!
//! - **sync**: mirror the archives advertised by the remote listing, by size
//! - **fetch**: pull identifiers out of the archives and fetch each raw record
//! - **validate**: cross-check every raw record against a freshly converted
//!   artifact and move the pair into `trusted/` or `quarantine/`
//!
//! Each stage derives its work list from the filesystem alone, so any of
//! them can be interrupted and rerun.
//!
//! # Example
//!
//! ```no_run
//! use haifu_ingest::{config::IngestConfig, layout::Layout, remote::RemoteSite};
//! use haifu_ingest::sync::IndexSynchronizer;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let root = Path::new("./mirror");
//!     let config = IngestConfig::load(root, None)?;
//!     let layout = Layout::new(root, &config.layout);
//!     let remote = RemoteSite::new(&config.remote)?;
//!
//!     let report = IndexSynchronizer::new(&config, layout, remote)?.run().await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod archive;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod listing;
pub mod progress;
pub mod rate_gate;
pub mod remote;
pub mod report;
pub mod selector;
pub mod status;
pub mod sync;
pub mod validate;

pub use error::{IngestError, Result};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// haifu - resumable game-log mirror
#[derive(Parser, Debug)]
#[command(name = "haifu")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Root directory holding index/, downloads/, trusted/ and quarantine/
    #[arg(long, env = "HAIFU_ROOT", default_value = ".", global = true)]
    pub root: PathBuf,

    /// Configuration file (defaults to <root>/haifu.toml when present)
    #[arg(long, env = "HAIFU_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Mirror index archives from the remote listing
    Sync,

    /// Extract identifiers from archives and fetch raw records
    Fetch,

    /// Validate raw records against converted artifacts and classify them
    Validate,

    /// Run sync, fetch and validate in order
    Run,

    /// Summarize local state
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}
