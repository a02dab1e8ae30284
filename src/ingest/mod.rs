//! Site ingestion pipeline.
//!
//! [`run_ingestion`] reads the domain risk ledger, discovers candidate URLs,
//! trims them to the mode's page budget and fetches them one at a time. It
//! never fails: every error ends up in the returned [`IngestionResult`].

mod evidence;
mod friction;
mod scheduler;
mod state;

pub use evidence::EvidenceBuilder;
pub use friction::{
    classify, detect_bot_protection, friction_signal, FrictionKind, BOT_PROTECTION_SIGNATURES,
    FRICTION_STATUSES, SIGNATURE_WINDOW_CHARS,
};
pub use state::{RunState, RunStateMachine, MAX_CONSECUTIVE_FRICTION};

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::cache::UrlFetchCache;
use crate::discovery::{DiscoveryEngine, DiscoveryResult};
use crate::http_client::PageFetcher;
use crate::models::{
    DiscoverySource, IngestionEvidence, IngestionMode, IngestionOutcome, IngestionRun, RiskPolicy,
};
use crate::prioritize::sample_sitemap_urls;
use crate::repository::{SharedStore, StoreError};
use crate::risk::DomainRiskLedger;

use scheduler::FetchScheduler;

/// Progress message sink.
pub type StatusCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Message used when a run ends without a single usable page.
pub const NO_USABLE_PAGES: &str = "No usable pages fetched";

/// Errors that end a run early. Converted into an `error` outcome at the top level.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

/// Runtime tuning for the pipeline.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub request_timeout: Duration,
    pub robots_timeout: Duration,
    pub sitemap_timeout: Duration,
    /// Starting politeness delay; raised by the host's risk record.
    pub default_delay_ms: u64,
    pub cache_ttl: chrono::Duration,
    pub light_pages: usize,
    pub standard_pages: usize,
    pub assisted_pages: usize,
    pub risk: RiskPolicy,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            robots_timeout: Duration::from_secs(5),
            sitemap_timeout: Duration::from_secs(10),
            default_delay_ms: 2000,
            cache_ttl: chrono::Duration::hours(crate::cache::DEFAULT_CACHE_TTL_HOURS),
            light_pages: 12,
            standard_pages: 25,
            assisted_pages: 12,
            risk: RiskPolicy::default(),
        }
    }
}

impl IngestSettings {
    /// Page budget for a mode.
    pub fn budget_for(&self, mode: IngestionMode) -> usize {
        match mode {
            IngestionMode::Light => self.light_pages,
            IngestionMode::Standard => self.standard_pages,
            IngestionMode::UserAssisted => self.assisted_pages,
        }
    }

    /// Budget for one run: `max_pages` overrides the mode's budget, except
    /// that user-assisted runs never exceed `assisted_pages`. At least 1.
    pub fn page_budget(&self, mode: IngestionMode, max_pages: Option<usize>) -> usize {
        let default = self.budget_for(mode);
        let budget = max_pages.unwrap_or(default);
        let budget = if mode == IngestionMode::UserAssisted {
            budget.min(default)
        } else {
            budget
        };
        budget.max(1)
    }
}

/// Per-run options.
#[derive(Clone, Default)]
pub struct IngestionOptions {
    pub mode: IngestionMode,
    /// URLs to fetch in `user_assisted` mode.
    pub user_urls: Vec<String>,
    /// Overrides the mode's page budget.
    pub max_pages: Option<usize>,
    /// Ignore cached entries.
    pub force_refresh: bool,
    pub on_status: Option<StatusCallback>,
    pub cancel: Option<CancellationToken>,
    /// Seed for the sitemap sampler.
    pub sampler_seed: Option<u64>,
}

impl IngestionOptions {
    pub fn new(mode: IngestionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

/// A page handed to downstream extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub url: String,
    /// Set when redirects moved the request elsewhere.
    pub final_url: Option<String>,
    pub html: String,
    pub from_cache: bool,
}

/// What a run produced.
#[derive(Debug, Clone)]
pub struct IngestionResult {
    /// `true` for `success` and `partial` outcomes that used at least one page.
    pub success: bool,
    pub outcome: IngestionOutcome,
    pub evidence: IngestionEvidence,
    pub pages: Vec<FetchedPage>,
    pub discovered_urls: Vec<String>,
    pub blocked_reason: Option<String>,
    pub run_id: Option<i64>,
    /// Internal failure or cancellation message.
    pub error: Option<String>,
}

/// Mutable state of one run, kept outside the pipeline future so a failure
/// still leaves partial evidence behind.
pub(crate) struct RunContext {
    pub evidence: EvidenceBuilder,
    pub state: RunStateMachine,
    pub pages: Vec<FetchedPage>,
    pub discovered_urls: Vec<String>,
    pub discovery: DiscoveryResult,
    pub blocked_reason: Option<String>,
    /// Run record as created at the start.
    pub run: Option<IngestionRun>,
    on_status: Option<StatusCallback>,
}

impl RunContext {
    pub fn status(&self, message: &str) {
        debug!("{}", message);
        if let Some(callback) = &self.on_status {
            callback(message);
        }
    }
}

/// Run the pipeline for one business site.
pub async fn run_ingestion(
    store: SharedStore,
    fetcher: &dyn PageFetcher,
    settings: &IngestSettings,
    business_slug: &str,
    root_url: &str,
    options: IngestionOptions,
) -> IngestionResult {
    let trace_id = Uuid::new_v4().to_string();
    info!(
        "Starting {} ingestion of {} for {} (trace {})",
        options.mode, root_url, business_slug, trace_id
    );

    let mut ctx = RunContext {
        evidence: EvidenceBuilder::new(&trace_id, options.mode),
        state: RunStateMachine::new(),
        pages: Vec::new(),
        discovered_urls: Vec::new(),
        discovery: DiscoveryResult::default(),
        blocked_reason: None,
        run: None,
        on_status: options.on_status.clone(),
    };

    let pipeline = execute(
        &mut ctx,
        store.clone(),
        fetcher,
        settings,
        business_slug,
        root_url,
        &options,
    );
    let error = match AssertUnwindSafe(pipeline).catch_unwind().await {
        Ok(Ok(())) => None,
        Ok(Err(IngestError::Cancelled)) => {
            ctx.state.cancel(ctx.evidence.pages_used);
            ctx.status("Cancelled");
            Some(IngestError::Cancelled.to_string())
        }
        Ok(Err(e)) => {
            ctx.state.fail();
            warn!("Ingestion of {} failed: {}", root_url, e);
            Some(e.to_string())
        }
        Err(panic) => {
            ctx.state.fail();
            let e = IngestError::Internal(panic_message(panic.as_ref()));
            warn!("Ingestion of {} panicked: {}", root_url, e);
            Some(e.to_string())
        }
    };

    finalize(ctx, store, root_url, error).await
}

async fn execute(
    ctx: &mut RunContext,
    store: SharedStore,
    fetcher: &dyn PageFetcher,
    settings: &IngestSettings,
    business_slug: &str,
    root_url: &str,
    options: &IngestionOptions,
) -> Result<(), IngestError> {
    let mut run = IngestionRun::new(business_slug, ctx.evidence.trace_id(), root_url, options.mode);
    run.id = store.create_ingestion_run(&run).await?;
    ctx.run = Some(run);

    let root = parse_root(root_url)?;
    let hostname = root
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or_else(|| IngestError::InvalidUrl {
            url: root_url.to_string(),
            reason: "missing host".to_string(),
        })?;

    let ledger = DomainRiskLedger::new(store.clone(), settings.risk.clone());
    let cache = UrlFetchCache::new(store, settings.cache_ttl).with_force_refresh(options.force_refresh);
    let cancel = options.cancel.clone().unwrap_or_default();

    let risk = ledger.get(&hostname).await?;
    ctx.evidence.set_domain_risk_score(risk.friction_count);
    let mut floor_delay_ms = settings.default_delay_ms;
    let mut delay_ms = risk.recommended_delay_ms.max(floor_delay_ms);

    let budget = settings.page_budget(options.mode, options.max_pages);

    let plan = if options.mode == IngestionMode::UserAssisted {
        ctx.evidence.add_source(DiscoverySource::UserList);
        plan_user_urls(&options.user_urls, budget)
    } else {
        let engine = DiscoveryEngine::new(fetcher, settings.robots_timeout, settings.sitemap_timeout);

        ctx.status("Fetching robots.txt");
        let robots = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            robots = engine.fetch_robots(&root) => robots,
        };
        if robots.found {
            ctx.evidence.add_source(DiscoverySource::RobotsTxt);
            if let Some(declared) = robots.crawl_delay_ms() {
                let crawl_delay = declared.min(settings.risk.max_delay_ms);
                if crawl_delay < declared {
                    warn!(
                        "Crawl-delay of {}ms for {} capped at {}ms",
                        declared, hostname, crawl_delay
                    );
                }
                floor_delay_ms = floor_delay_ms.max(crawl_delay);
                // Only a longer delay is persisted; a shorter one never relaxes the ledger.
                if crawl_delay > delay_ms {
                    let risk = ledger.set_recommended_delay(&hostname, crawl_delay).await?;
                    delay_ms = risk.recommended_delay_ms;
                }
            }
        }

        ctx.status("Fetching sitemap");
        let sitemap = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            sitemap = engine.fetch_sitemap(&root, &robots) => sitemap,
        };
        if sitemap.found {
            ctx.evidence.add_source(DiscoverySource::Sitemap);
            ctx.discovered_urls.extend(sitemap.urls.iter().cloned());
        }

        let root_key = normalize_url(root.as_str()).unwrap_or_else(|| root.to_string());
        let candidates: Vec<String> = sitemap
            .urls
            .iter()
            .filter(|url| robots.is_allowed(url))
            .filter(|url| normalize_url(url).as_deref() != Some(root_key.as_str()))
            .cloned()
            .collect();

        ctx.discovery.robots = Some(robots);
        ctx.discovery.sitemap = Some(sitemap);

        let mut plan = vec![root_key];
        let remaining = budget - 1;
        let sampled = match options.sampler_seed {
            Some(seed) => sample_sitemap_urls(&candidates, remaining, &mut StdRng::seed_from_u64(seed)),
            None => sample_sitemap_urls(&candidates, remaining, &mut rand::rng()),
        };
        plan.extend(sampled);
        dedupe(plan)
    };

    ctx.evidence.add_planned(plan.len());
    info!(
        "Planned {} of {} pages for {} (sources: {:?})",
        plan.len(),
        budget,
        hostname,
        ctx.evidence.sources()
    );

    let mut scheduler = FetchScheduler {
        fetcher,
        cache: &cache,
        ledger: &ledger,
        request_timeout: settings.request_timeout,
        cancel: &cancel,
        root,
        hostname,
        mode: options.mode,
        budget,
        delay_ms,
        floor_delay_ms,
        queue: plan.into_iter().collect(),
        queued: HashSet::new(),
    };
    scheduler.run(ctx).await
}

async fn finalize(
    mut ctx: RunContext,
    store: SharedStore,
    root_url: &str,
    error: Option<String>,
) -> IngestionResult {
    let state = ctx.state.state();
    let outcome = if state.is_terminal() {
        state.outcome()
    } else {
        ctx.state.fail().outcome()
    };

    if outcome == IngestionOutcome::Error && ctx.evidence.pages_used == 0 && ctx.blocked_reason.is_none() {
        ctx.blocked_reason = Some(NO_USABLE_PAGES.to_string());
    }

    let evidence = ctx.evidence.build(outcome);

    let run_id = ctx.run.as_ref().map(|run| run.id);
    if let Some(mut run) = ctx.run.take() {
        evidence.apply_to(&mut run);
        run.last_error = error.clone().or_else(|| ctx.blocked_reason.clone());
        run.completed_at = Some(Utc::now());
        if let Err(e) = store.complete_ingestion_run(&run).await {
            warn!("Failed to record completion of run {}: {}", run.id, e);
        }
    }

    info!(
        "Ingestion of {} finished: {} ({} used / {} fetched / {} planned, {} cache hits) in {}ms",
        root_url,
        outcome,
        evidence.ingest.pages_used,
        evidence.ingest.pages_fetched,
        evidence.ingest.pages_planned,
        evidence.ingest.cache_hits,
        evidence.ingest.duration_ms
    );

    IngestionResult {
        success: outcome.is_usable() && evidence.ingest.pages_used > 0,
        outcome,
        evidence,
        pages: ctx.pages,
        discovered_urls: ctx.discovered_urls,
        blocked_reason: ctx.blocked_reason,
        run_id,
        error,
    }
}

fn parse_root(root_url: &str) -> Result<Url, IngestError> {
    let invalid = |reason: String| IngestError::InvalidUrl {
        url: root_url.to_string(),
        reason,
    };
    let url = Url::parse(root_url.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    Ok(url)
}

/// Caller-supplied URLs: well-formed http(s) only, deduped, up to `budget`.
fn plan_user_urls(user_urls: &[String], budget: usize) -> Vec<String> {
    let valid: Vec<String> = user_urls
        .iter()
        .filter_map(|url| {
            let parsed = Url::parse(url.trim()).ok()?;
            if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
                debug!("Skipping unusable user URL {}", url);
                return None;
            }
            normalize_url(parsed.as_str())
        })
        .collect();
    let mut plan = dedupe(valid);
    plan.truncate(budget);
    plan
}

/// URL without its fragment, in `Url`'s canonical form.
pub(crate) fn normalize_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

fn dedupe(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(normalize_url(url).unwrap_or_else(|| url.clone())))
        .collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
