//! `haifu fetch` command implementation

use super::Context;
use crate::error::Result;
use crate::fetch::RecordFetcher;
use crate::report::FetchReport;

/// Extract identifiers and fetch missing raw records
pub async fn run(ctx: &Context) -> Result<FetchReport> {
    let report = RecordFetcher::new(&ctx.config, ctx.layout.clone(), ctx.remote.clone())?
        .with_progress(ctx.progress)
        .run()
        .await?;

    println!("{}", report);
    Ok(report)
}
