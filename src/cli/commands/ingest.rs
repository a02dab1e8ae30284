//! `run` command: ingest one site.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::http_client::HttpClient;
use crate::ingest::{run_ingestion, IngestionOptions, IngestionResult};
use crate::models::IngestionMode;
use crate::repository::{InMemoryIngestionStore, SharedStore};

use crate::cli::helpers::{format_duration_ms, styled_outcome, truncate};
use super::open_store;

pub struct RunArgs {
    pub slug: String,
    pub root_url: String,
    pub mode: IngestionMode,
    pub urls: Vec<String>,
    pub max_pages: Option<usize>,
    pub force_refresh: bool,
    pub json: bool,
    pub memory: bool,
}

/// Run the ingestion pipeline and print the result.
pub async fn cmd_run(config: &Config, args: RunArgs) -> anyhow::Result<()> {
    if args.mode == IngestionMode::UserAssisted && args.urls.is_empty() {
        anyhow::bail!("user-assisted mode needs at least one --url");
    }

    let store: SharedStore = if args.memory {
        Arc::new(InMemoryIngestionStore::new())
    } else {
        open_store(config).await?
    };
    let fetcher = HttpClient::with_user_agent(config.user_agent.as_deref())?;
    let settings = config.ingest_settings();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("Ingesting {}...", args.root_url));

    let status_pb = pb.clone();
    let options = IngestionOptions {
        mode: args.mode,
        user_urls: args.urls,
        max_pages: args.max_pages,
        force_refresh: args.force_refresh,
        on_status: Some(Arc::new(move |message: &str| {
            status_pb.set_message(truncate(message, 100));
        })),
        cancel: Some(cancel),
        sampler_seed: None,
    };

    let result = run_ingestion(
        store,
        &fetcher,
        &settings,
        &args.slug,
        &args.root_url,
        options,
    )
    .await;
    pb.finish_and_clear();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.evidence)?);
    } else {
        print_summary(&args.root_url, &result);
    }

    if result.success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn print_summary(root_url: &str, result: &IngestionResult) {
    let ingest = &result.evidence.ingest;
    let marker = if result.success {
        style("✓").green()
    } else {
        style("✗").red()
    };

    println!(
        "{} {} {} ({})",
        marker,
        style(root_url).bold(),
        styled_outcome(result.outcome),
        format_duration_ms(ingest.duration_ms)
    );
    if let Some(run_id) = result.run_id {
        println!("  {:<16} {}", "Run:", run_id);
    }
    println!("  {:<16} {}", "Trace:", result.evidence.trace_id);
    println!("  {:<16} {}", "Mode:", ingest.mode);
    let sources: Vec<&str> = ingest.discovery_sources.iter().map(|s| s.as_str()).collect();
    println!("  {:<16} {}", "Sources:", sources.join(", "));
    println!(
        "  {:<16} {} used / {} fetched / {} planned",
        "Pages:", ingest.pages_used, ingest.pages_fetched, ingest.pages_planned
    );
    println!(
        "  {:<16} {} hits / {} misses",
        "Cache:", ingest.cache_hits, ingest.cache_misses
    );
    println!("  {:<16} {}", "Domain risk:", ingest.domain_risk_score);

    for signal in &ingest.friction_signals {
        println!("  {} friction {}", style("!").yellow(), signal);
    }
    if let Some(reason) = &result.blocked_reason {
        println!("  {} {}", style("→").dim(), reason);
    }
    if let Some(error) = &result.error {
        println!("  {} {}", style("✗").red(), error);
    }
    for page in &result.pages {
        println!(
            "  {} {} ({} bytes)",
            style("•").cyan(),
            page.final_url.as_deref().unwrap_or(&page.url),
            page.html.len()
        );
    }
}
