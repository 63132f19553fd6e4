//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function. All of them
//! share a [`Context`] resolved once from the global flags.

pub mod fetch;
pub mod run;
pub mod status;
pub mod sync;
pub mod validate;

use crate::config::IngestConfig;
use crate::error::Result;
use crate::layout::Layout;
use crate::remote::RemoteSite;
use crate::Cli;
use std::io::IsTerminal;
use tracing::debug;

/// Resolved configuration plus the pieces every stage needs
#[derive(Debug, Clone)]
pub struct Context {
    pub config: IngestConfig,
    pub layout: Layout,
    pub remote: RemoteSite,
    /// Draw progress bars on stderr
    pub progress: bool,
}

impl Context {
    pub fn new(config: IngestConfig, layout: Layout, progress: bool) -> Result<Self> {
        let remote = RemoteSite::new(&config.remote)?;
        Ok(Self {
            config,
            layout,
            remote,
            progress,
        })
    }

    /// Apply CLI overrides on top of the file and environment layers
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut config = IngestConfig::load(&cli.root, cli.config.as_deref())?;
        if let Some(workers) = cli.workers {
            config.pipeline.workers = workers;
            config.validate()?;
        }

        let layout = Layout::new(&cli.root, &config.layout);
        debug!(
            root = %layout.root.display(),
            workers = config.pipeline.workers,
            "Resolved configuration"
        );

        let progress = !cli.verbose && std::io::stderr().is_terminal();
        Self::new(config, layout, progress)
    }
}
