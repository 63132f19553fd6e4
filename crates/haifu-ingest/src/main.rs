//! haifu - main entry point

use anyhow::Context as _;
use clap::Parser;
use haifu_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use haifu_ingest::commands::{self, Context};
use haifu_ingest::{Cli, Commands};
use std::process;
use tracing::{error, warn};

/// Conventional exit status after SIGINT
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .log_file_prefix("haifu")
        .filter_directives("hyper=warn,reqwest=warn")
        .build();

    // Environment variables take precedence
    let log_config = match log_config.clone().with_env_overrides() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring HAIFU_LOG_* overrides: {}", e);
            log_config
        },
    };

    // The mirror works without logging, so a failed init is not fatal
    let guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        },
    };

    let code = tokio::select! {
        result = execute_command(&cli) => match result {
            Ok(()) => 0,
            Err(e) => {
                error!(error = %e, "Command failed");
                eprintln!("Error: {:#}", e);
                1
            },
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; completed items are kept, rerun to resume");
            eprintln!("Interrupted");
            EXIT_INTERRUPTED
        }
    };

    // process::exit skips destructors; flush the file writer first
    drop(guard);
    if code != 0 {
        process::exit(code);
    }
}

async fn execute_command(cli: &Cli) -> anyhow::Result<()> {
    let ctx = Context::from_cli(cli).context("Failed to resolve configuration")?;

    match &cli.command {
        Commands::Sync => {
            commands::sync::run(&ctx).await.context("sync failed")?;
        },
        Commands::Fetch => {
            commands::fetch::run(&ctx).await.context("fetch failed")?;
        },
        Commands::Validate => {
            commands::validate::run(&ctx).await.context("validate failed")?;
        },
        Commands::Run => {
            commands::run::run(&ctx).await.context("run failed")?;
        },
        Commands::Status { json } => {
            commands::status::run(&ctx, *json).context("status failed")?;
        },
    }

    Ok(())
}
