//! Sequential fetch loop.
//!
//! One request in flight per run. Each URL is resolved (cache hit, friction
//! or success) before the next one starts; the politeness delay separates
//! network requests.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::friction::{classify, friction_signal, FrictionKind};
use super::state::RunState;
use super::{normalize_url, FetchedPage, IngestError, RunContext};
use crate::cache::UrlFetchCache;
use crate::discovery::{extract_json_ld, extract_links, HomepageFindings};
use crate::http_client::{FetchResponse, PageFetcher};
use crate::models::{DiscoverySource, DomainRisk, IngestionMode};
use crate::prioritize::prioritize_homepage_links;
use crate::risk::DomainRiskLedger;

/// Bodies at or below this many characters are not used.
pub const MIN_USABLE_CHARS: usize = 100;

pub(crate) struct FetchScheduler<'a> {
    pub fetcher: &'a dyn PageFetcher,
    pub cache: &'a UrlFetchCache,
    pub ledger: &'a DomainRiskLedger,
    pub request_timeout: Duration,
    pub cancel: &'a CancellationToken,
    pub root: Url,
    pub hostname: String,
    pub mode: IngestionMode,
    pub budget: usize,
    pub delay_ms: u64,
    /// Lower bound for `delay_ms` during this run (default delay or crawl-delay).
    pub floor_delay_ms: u64,
    pub queue: VecDeque<String>,
    pub queued: HashSet<String>,
}

impl FetchScheduler<'_> {
    pub async fn run(&mut self, ctx: &mut RunContext) -> Result<(), IngestError> {
        ctx.state.start_fetching();
        for url in &self.queue {
            self.queued
                .insert(normalize_url(url).unwrap_or_else(|| url.clone()));
        }

        let mut processed = 0usize;
        let mut network_requests = 0usize;

        while let Some(url) = self.queue.pop_front() {
            if self.cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            let first = processed == 0;
            processed += 1;
            let hostname = DomainRiskLedger::extract_hostname(&url)
                .unwrap_or_else(|| self.hostname.clone());

            if self.cache.get(&url).await?.is_some() {
                ctx.evidence.cache_hits += 1;
                ctx.status(&format!("Cached {}", url));
                continue;
            }
            ctx.evidence.cache_misses += 1;

            if network_requests > 0 {
                debug!("Waiting {}ms before {}", self.delay_ms, url);
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(IngestError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(self.delay_ms)) => {}
                }
            }

            ctx.status(&format!(
                "Fetching {}/{}: {}",
                processed, ctx.evidence.pages_planned, url
            ));
            network_requests += 1;
            ctx.evidence.pages_fetched += 1;

            let response = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(IngestError::Cancelled),
                result = self.fetcher.fetch(&url, self.request_timeout) => match result {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Fetch of {} failed: {}", url, e);
                        FetchResponse::new(0, &url, String::new())
                    }
                },
            };

            if let Some(kind) = classify(response.status, &response.body) {
                let retry_after = response.retry_after_secs();
                if self
                    .on_friction(ctx, &url, &hostname, response.status, kind, retry_after)
                    .await?
                {
                    return Ok(());
                }
                continue;
            }

            if !response.is_success() {
                debug!("Skipping {}: status {}", url, response.status);
                continue;
            }

            ctx.state.on_success();
            if response.body.chars().count() > MIN_USABLE_CHARS {
                ctx.evidence.pages_used += 1;
                self.cache
                    .record(&url, &hostname, response.status, &response.body)
                    .await?;
                let risk = self.ledger.record_success(&hostname).await?;
                self.adopt(ctx, &risk, &hostname);

                if first && self.mode != IngestionMode::UserAssisted {
                    self.fold_in_homepage(ctx, &response);
                }

                let final_url = (response.final_url != url).then(|| response.final_url.clone());
                ctx.pages.push(FetchedPage {
                    url,
                    final_url,
                    html: response.body,
                    from_cache: false,
                });
            }
        }

        let state = ctx
            .state
            .finish(ctx.evidence.pages_used, ctx.evidence.pages_planned);
        debug!("Queue exhausted for {}: {:?}", self.hostname, state);
        Ok(())
    }

    /// Record a friction event. Returns `true` when the run must stop.
    async fn on_friction(
        &mut self,
        ctx: &mut RunContext,
        url: &str,
        hostname: &str,
        status: u16,
        kind: FrictionKind,
        retry_after_secs: Option<u64>,
    ) -> Result<bool, IngestError> {
        warn!("Friction at {}: {}", url, kind);
        ctx.evidence.add_friction_signal(friction_signal(status, url));
        let risk = self.ledger.record_friction(hostname, status).await?;
        self.adopt(ctx, &risk, hostname);

        // Retry-After only lengthens the wait before the next request.
        if let Some(secs) = retry_after_secs {
            let wait_ms = secs
                .saturating_mul(1000)
                .min(self.ledger.policy().max_delay_ms);
            if wait_ms > self.delay_ms {
                debug!("Honoring Retry-After of {}ms from {}", wait_ms, url);
                self.delay_ms = wait_ms;
            }
        }

        match ctx.state.on_friction(kind.is_bot_protection()) {
            RunState::Blocked => {
                let reason = format!("Bot protection detected at {} ({}, status {})", url, kind, status);
                warn!("Stopping run: {}", reason);
                ctx.status("Stopped: bot protection detected");
                ctx.blocked_reason = Some(reason);
                Ok(true)
            }
            RunState::Partial => {
                let reason = format!(
                    "Stopped after {} consecutive friction responses (last: {} at {})",
                    ctx.state.consecutive_friction(),
                    kind,
                    url
                );
                warn!("Stopping run: {}", reason);
                ctx.status("Stopped: repeated friction");
                ctx.blocked_reason = Some(reason);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Use the delay from the latest risk record for the run's host.
    fn adopt(&mut self, ctx: &mut RunContext, risk: &DomainRisk, hostname: &str) {
        if hostname == self.hostname {
            self.delay_ms = risk.recommended_delay_ms.max(self.floor_delay_ms);
            ctx.evidence.set_domain_risk_score(risk.friction_count);
        }
    }

    /// Extract links and JSON-LD from the first page and queue the best
    /// new links within the remaining budget.
    fn fold_in_homepage(&mut self, ctx: &mut RunContext, response: &FetchResponse) {
        if let Some(json_ld) = extract_json_ld(&response.body) {
            debug!("JSON-LD on {}: {:?}", response.final_url, json_ld.ld_type);
            ctx.evidence.add_source(DiscoverySource::JsonLd);
            ctx.discovery.json_ld = Some(json_ld);
        }

        let base = Url::parse(&response.final_url).unwrap_or_else(|_| self.root.clone());
        let links = extract_links(&response.body, &base);
        if links.is_empty() {
            return;
        }
        ctx.evidence.add_source(DiscoverySource::Homepage);

        let fresh: Vec<String> = links
            .iter()
            .filter(|link| ctx.discovery.is_allowed(link))
            .filter(|link| {
                let key = normalize_url(link).unwrap_or_else(|| (*link).clone());
                !self.queued.contains(&key)
            })
            .cloned()
            .collect();
        for link in &fresh {
            if !ctx.discovered_urls.contains(link) {
                ctx.discovered_urls.push(link.clone());
            }
        }

        let remaining = self
            .budget
            .saturating_sub(ctx.evidence.pages_planned as usize);
        let picked = prioritize_homepage_links(&fresh, remaining);
        if !picked.is_empty() {
            info!(
                "Adding {} homepage links for {}",
                picked.len(),
                self.hostname
            );
        }
        for link in &picked {
            self.queued
                .insert(normalize_url(link).unwrap_or_else(|| link.clone()));
        }
        ctx.evidence.add_planned(picked.len());
        self.queue.extend(picked);

        ctx.discovery.homepage = Some(HomepageFindings { found: true, links });
    }
}
