//! `haifu status` command implementation
//!
//! Shows what the filesystem says about the mirror.

use super::Context;
use crate::error::Result;
use crate::status::StatusReport;
use colored::Colorize;

pub fn run(ctx: &Context, json: bool) -> Result<StatusReport> {
    let report = StatusReport::collect(&ctx.layout)?;

    if json {
        let text = serde_json::to_string_pretty(&report).map_err(haifu_common::HaifuError::from)?;
        println!("{}", text);
        return Ok(report);
    }

    println!("{}", "Mirror Status:".cyan().bold());
    println!("  Root: {}", ctx.layout.root.display());
    println!();
    println!("{}", report);

    if report.raw_empty > 0 {
        println!();
        println!(
            "{}",
            format!("{} empty raw records; run 'haifu fetch' to retry them", report.raw_empty)
                .yellow()
        );
    }

    Ok(report)
}
