//! `haifu sync` command implementation

use super::Context;
use crate::error::Result;
use crate::report::SyncReport;
use crate::sync::IndexSynchronizer;

/// Mirror the remote index
pub async fn run(ctx: &Context) -> Result<SyncReport> {
    let report = IndexSynchronizer::new(&ctx.config, ctx.layout.clone(), ctx.remote.clone())?
        .with_progress(ctx.progress)
        .run()
        .await?;

    println!("{}", report);
    Ok(report)
}
