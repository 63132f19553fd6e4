//! `haifu validate` command implementation

use super::Context;
use crate::error::Result;
use crate::report::ValidateReport;
use crate::validate::PairValidator;

/// Classify every downloaded pair
pub async fn run(ctx: &Context) -> Result<ValidateReport> {
    let report = PairValidator::new(&ctx.config, ctx.layout.clone(), ctx.remote.clone())
        .with_progress(ctx.progress)
        .run()
        .await?;

    println!("{}", report);
    Ok(report)
}
