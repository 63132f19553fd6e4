//! `haifu run` command implementation
//!
//! The three stages in order. A fatal error in one stage stops the run;
//! whatever earlier stages completed stays on disk.

use super::Context;
use crate::error::Result;
use crate::report::{FetchReport, SyncReport, ValidateReport};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub sync: SyncReport,
    pub fetch: FetchReport,
    pub validate: ValidateReport,
}

pub async fn run(ctx: &Context) -> Result<RunReport> {
    info!("Starting full pipeline run");
    let sync = super::sync::run(ctx).await?;
    let fetch = super::fetch::run(ctx).await?;
    let validate = super::validate::run(ctx).await?;
    info!("Pipeline run complete");

    Ok(RunReport {
        sync,
        fetch,
        validate,
    })
}
