//! `runs` command: list recent ingestion runs.

use console::style;

use crate::config::Config;

use crate::cli::helpers::{format_duration_ms, styled_outcome, truncate};
use super::open_store;

pub async fn cmd_runs(config: &Config, slug: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let runs = store.list_ingestion_runs(slug, limit).await?;

    if runs.is_empty() {
        println!("{} No ingestion runs found", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<6} {:<17} {:<16} {:<14} {:<12} {:>14} {:>9}  {}",
        "ID", "Started", "Business", "Mode", "Outcome", "Used/Fetched", "Duration", "Root URL"
    );
    println!("{}", "-".repeat(110));

    for run in runs {
        println!(
            "{:<6} {:<17} {:<16} {:<14} {:<12} {:>14} {:>9}  {}",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M"),
            truncate(&run.business_slug, 16),
            run.mode.as_str(),
            styled_outcome(run.outcome).to_string(),
            format!("{}/{}", run.pages_used, run.pages_fetched),
            format_duration_ms(run.duration_ms),
            truncate(&run.root_url, 40),
        );
        if let Some(error) = &run.last_error {
            println!("       {} {}", style("→").dim(), truncate(error, 100));
        }
    }

    Ok(())
}
