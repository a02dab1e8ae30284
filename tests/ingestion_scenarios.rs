//! End-to-end ingestion scenarios.
//!
//! Drives `run_ingestion` against a scripted in-process fetcher and the
//! in-memory store. Time is paused so politeness sleeps are virtual.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use site_ingest::http_client::{FetchError, FetchResponse, PageFetcher};
use site_ingest::ingest::NO_USABLE_PAGES;
use site_ingest::models::{DiscoverySource, IngestionMode, IngestionOutcome, IngestionRun};
use site_ingest::repository::{
    InMemoryIngestionStore, IngestionStore, SharedStore, SqliteIngestionStore, StoreError,
    StoreResult,
};
use site_ingest::{run_ingestion, IngestSettings, IngestionOptions, IngestionResult};

const ROOT: &str = "https://shop.test/";

#[derive(Clone)]
enum Reply {
    Page(u16, String),
    /// 429 carrying a Retry-After header, in seconds.
    Throttled(u64),
    Fail,
    Panic,
}

/// Fetcher answering from a script. The last reply for a URL repeats;
/// unknown URLs get a 404.
#[derive(Default)]
struct ScriptedFetcher {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    log: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn new() -> Self {
        Self::default()
    }

    fn route(self, url: &str, reply: Reply) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    fn page(self, url: &str, body: &str) -> Self {
        self.route(url, Reply::Page(200, body.to_string()))
    }

    fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| u.as_str() == url).count()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<FetchResponse, FetchError> {
        self.log.lock().unwrap().push(url.to_string());
        let reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match reply {
            Some(Reply::Page(status, body)) => Ok(FetchResponse::new(status, url, body)),
            Some(Reply::Throttled(secs)) => {
                let mut response = FetchResponse::new(429, url, "slow down");
                response
                    .headers
                    .insert("retry-after".to_string(), secs.to_string());
                Ok(response)
            }
            Some(Reply::Fail) => Err(FetchError::Timeout),
            Some(Reply::Panic) => panic!("scripted fetcher exploded"),
            None => Ok(FetchResponse::new(404, url, "not found")),
        }
    }
}

fn body(title: &str) -> String {
    format!(
        "<html><head><title>{title}</title></head><body><h1>{title}</h1><p>{}</p></body></html>",
        "Fresh sourdough and seasonal pastries, made every morning in our kitchen. ".repeat(3)
    )
}

fn sitemap(paths: &[&str]) -> String {
    let entries: String = paths
        .iter()
        .map(|p| format!("<url><loc>https://shop.test{}</loc></url>", p))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
        entries
    )
}

fn options(mode: IngestionMode) -> IngestionOptions {
    IngestionOptions {
        sampler_seed: Some(7),
        ..IngestionOptions::new(mode)
    }
}

async fn ingest(
    store: &Arc<InMemoryIngestionStore>,
    fetcher: &ScriptedFetcher,
    options: IngestionOptions,
) -> IngestionResult {
    run_ingestion(
        store.clone(),
        fetcher,
        &IngestSettings::default(),
        "bakery",
        "https://shop.test",
        options,
    )
    .await
}

async fn stored_run(store: &dyn IngestionStore, result: &IngestionResult) -> IngestionRun {
    store
        .get_ingestion_run(result.run_id.expect("run id"))
        .await
        .unwrap()
        .expect("run record")
}

fn assert_counter_invariants(result: &IngestionResult) {
    let ingest = &result.evidence.ingest;
    assert!(ingest.pages_used <= ingest.pages_fetched);
    assert_eq!(ingest.pages_used as usize, result.pages.len());
    if ingest.outcome == IngestionOutcome::Success {
        assert!(ingest.pages_used >= 1);
    }
}

#[tokio::test(start_paused = true)]
async fn bot_protection_on_root_blocks_run() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let fetcher = ScriptedFetcher::new()
        .page(
            ROOT,
            "<html><title>Just a moment...</title>Checking your browser before accessing shop.test</html>",
        )
        .page("https://shop.test/about", &body("About"));

    let result = ingest(&store, &fetcher, options(IngestionMode::Light)).await;

    assert_eq!(result.outcome, IngestionOutcome::Blocked);
    assert!(!result.success);
    assert_eq!(result.evidence.ingest.pages_used, 0);
    assert_eq!(result.evidence.ingest.pages_fetched, 1);
    assert_eq!(
        result.evidence.ingest.friction_signals,
        vec![format!("200:{}", ROOT)]
    );
    assert!(result
        .blocked_reason
        .as_deref()
        .unwrap()
        .contains("Bot protection"));
    assert!(result.pages.is_empty());
    assert_eq!(fetcher.count(ROOT), 1);
    assert_eq!(fetcher.count("https://shop.test/about"), 0);

    let run = stored_run(store.as_ref(), &result).await;
    assert_eq!(run.outcome, IngestionOutcome::Blocked);
    assert!(run.is_complete());
    let risk = store.get_domain_risk("shop.test").await.unwrap().unwrap();
    assert_eq!(risk.friction_count, 1);
    assert_eq!(risk.last_friction_status, Some(200));
    assert_counter_invariants(&result);
}

#[tokio::test(start_paused = true)]
async fn user_assisted_fetches_exactly_the_supplied_urls() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let urls = [
        "https://shop.test/menu",
        "https://shop.test/story",
        "https://shop.test/visit",
    ];
    let mut fetcher = ScriptedFetcher::new();
    for url in urls {
        fetcher = fetcher.page(url, &body(url));
    }

    let result = ingest(
        &store,
        &fetcher,
        IngestionOptions {
            user_urls: urls.iter().map(|u| u.to_string()).collect(),
            ..options(IngestionMode::UserAssisted)
        },
    )
    .await;

    let ingest = &result.evidence.ingest;
    assert_eq!(result.outcome, IngestionOutcome::Success);
    assert!(result.success);
    assert_eq!(ingest.discovery_sources, vec![DiscoverySource::UserList]);
    assert_eq!(ingest.pages_planned, 3);
    assert_eq!(ingest.pages_used, 3);
    assert_eq!(fetcher.requests(), urls.to_vec());
    assert_eq!(
        result.pages.iter().map(|p| p.url.as_str()).collect::<Vec<_>>(),
        urls.to_vec()
    );
    assert!(result.pages.iter().all(|p| !p.from_cache && p.final_url.is_none()));
    assert_eq!(result.blocked_reason, None);
    assert_counter_invariants(&result);
}

#[tokio::test(start_paused = true)]
async fn user_assisted_list_is_capped_by_assisted_budget() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let urls: Vec<String> = (0..15).map(|i| format!("https://shop.test/p{}", i)).collect();
    let mut fetcher = ScriptedFetcher::new();
    for url in &urls {
        fetcher = fetcher.page(url, &body(url));
    }

    let result = ingest(
        &store,
        &fetcher,
        IngestionOptions {
            user_urls: urls.clone(),
            max_pages: Some(20),
            ..options(IngestionMode::UserAssisted)
        },
    )
    .await;

    let ingest = &result.evidence.ingest;
    assert_eq!(result.outcome, IngestionOutcome::Success);
    assert_eq!(ingest.pages_planned, 12);
    assert_eq!(ingest.pages_used, 12);
    assert_eq!(fetcher.requests(), urls[..12].to_vec());
    assert_eq!(fetcher.count("https://shop.test/p12"), 0);
    assert_counter_invariants(&result);
}

#[tokio::test(start_paused = true)]
async fn retry_after_lengthens_next_wait() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let fetcher = ScriptedFetcher::new()
        .page("https://shop.test/sitemap.xml", &sitemap(&["/about", "/faq"]))
        .route(ROOT, Reply::Throttled(10))
        .page("https://shop.test/about", &body("About"))
        .page("https://shop.test/faq", &body("FAQ"));

    let result = ingest(&store, &fetcher, options(IngestionMode::Light)).await;

    let ingest = &result.evidence.ingest;
    assert_eq!(result.outcome, IngestionOutcome::Success);
    assert_eq!(ingest.pages_used, 2);
    assert_eq!(ingest.friction_signals, vec![format!("429:{}", ROOT)]);
    // 10s from Retry-After, then the ledger delay after one success (4000 * 0.8).
    assert_eq!(ingest.duration_ms, 13_200);
}

#[tokio::test(start_paused = true)]
async fn retry_after_is_capped_at_max_delay() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let fetcher = ScriptedFetcher::new()
        .page("https://shop.test/sitemap.xml", &sitemap(&["/about"]))
        .route(ROOT, Reply::Throttled(3600))
        .page("https://shop.test/about", &body("About"));

    let result = ingest(&store, &fetcher, options(IngestionMode::Light)).await;

    assert_eq!(result.evidence.ingest.pages_used, 1);
    assert_eq!(result.evidence.ingest.duration_ms, 30_000);
}

#[tokio::test(start_paused = true)]
async fn two_consecutive_rate_limits_stop_partial() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let fetcher = ScriptedFetcher::new()
        .page(
            "https://shop.test/sitemap.xml",
            &sitemap(&["/about", "/services", "/contact"]),
        )
        .route(ROOT, Reply::Page(429, "slow down".to_string()))
        .route("https://shop.test/about", Reply::Page(429, "slow down".to_string()))
        .page("https://shop.test/services", &body("Services"));

    let result = ingest(&store, &fetcher, options(IngestionMode::Light)).await;

    let ingest = &result.evidence.ingest;
    assert_eq!(result.outcome, IngestionOutcome::Partial);
    assert!(!result.success);
    assert_eq!(ingest.pages_fetched, 2);
    assert_eq!(ingest.pages_used, 0);
    assert_eq!(ingest.pages_planned, 4);
    assert_eq!(
        ingest.friction_signals,
        vec![
            format!("429:{}", ROOT),
            "429:https://shop.test/about".to_string()
        ]
    );
    assert_eq!(fetcher.count("https://shop.test/services"), 0);
    assert!(result.blocked_reason.unwrap().contains("consecutive friction"));

    let risk = store.get_domain_risk("shop.test").await.unwrap().unwrap();
    assert_eq!(risk.friction_count, 2);
    assert_eq!(risk.recommended_delay_ms, 8000);
    assert_eq!(ingest.domain_risk_score, 2);
    // One politeness sleep between the two requests, at the escalated delay.
    assert_eq!(ingest.duration_ms, 4000);
}

#[tokio::test(start_paused = true)]
async fn isolated_network_failure_does_not_stop_run() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let fetcher = ScriptedFetcher::new()
        .page("https://shop.test/sitemap.xml", &sitemap(&["/about", "/pricing"]))
        .page(ROOT, &body("Home"))
        .route("https://shop.test/about", Reply::Fail)
        .page("https://shop.test/pricing", &body("Pricing"));

    let result = ingest(&store, &fetcher, options(IngestionMode::Light)).await;

    let ingest = &result.evidence.ingest;
    assert_eq!(result.outcome, IngestionOutcome::Success);
    assert_eq!(ingest.pages_fetched, 3);
    assert_eq!(ingest.pages_used, 2);
    assert_eq!(ingest.friction_signals, vec!["0:https://shop.test/about"]);
    assert_eq!(
        ingest.discovery_sources,
        vec![DiscoverySource::Sitemap]
    );
    assert_counter_invariants(&result);
}

#[tokio::test(start_paused = true)]
async fn robots_disallow_filters_candidates() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let home = r#"<html><body>
        <a href="/admin/login">Admin</a>
        <a href="/contact">Contact</a>
        <p>Fresh sourdough and seasonal pastries, made every morning in our kitchen and sold at the counter.</p>
    </body></html>"#;
    let fetcher = ScriptedFetcher::new()
        .page(
            "https://shop.test/robots.txt",
            "User-agent: *\nDisallow: /admin\n\nSitemap: https://shop.test/sm.xml\n",
        )
        .page(
            "https://shop.test/sm.xml",
            &sitemap(&["/admin/panel", "/about", "/admin"]),
        )
        .page(ROOT, home)
        .page("https://shop.test/about", &body("About"))
        .page("https://shop.test/contact", &body("Contact"));

    let result = ingest(&store, &fetcher, options(IngestionMode::Light)).await;

    let requests = fetcher.requests();
    assert!(requests.iter().all(|u| !u.contains("/admin")));
    assert!(!requests.contains(&"https://shop.test/sitemap.xml".to_string()));
    assert!(result
        .discovered_urls
        .contains(&"https://shop.test/admin/panel".to_string()));
    assert_eq!(
        result.evidence.ingest.discovery_sources,
        vec![
            DiscoverySource::RobotsTxt,
            DiscoverySource::Sitemap,
            DiscoverySource::Homepage
        ]
    );
    assert_eq!(result.evidence.ingest.pages_used, 3);
    assert_eq!(result.outcome, IngestionOutcome::Success);
    assert_counter_invariants(&result);
}

#[tokio::test(start_paused = true)]
async fn homepage_links_fill_budget_when_sitemap_missing() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let home = format!(
        r#"<html><head>
            <script type="application/ld+json">{{"@context":"https://schema.org","@type":"Bakery","name":"Shop"}}</script>
        </head><body>
            <a href="/gallery">Gallery</a>
            <a href="/contact">Contact</a>
            <a href="mailto:hello@shop.test">Mail</a>
            <a href="https://elsewhere.test/about">Partner</a>
            <a href="/about-us">About</a>
            <a href="/">Home</a>
            {}
        </body></html>"#,
        body("Home")
    );
    let fetcher = ScriptedFetcher::new()
        .page(ROOT, &home)
        .page("https://shop.test/about-us", &body("About"))
        .page("https://shop.test/contact", &body("Contact"))
        .page("https://shop.test/gallery", &body("Gallery"));

    let result = ingest(
        &store,
        &fetcher,
        IngestionOptions {
            max_pages: Some(3),
            ..options(IngestionMode::Light)
        },
    )
    .await;

    let ingest = &result.evidence.ingest;
    assert_eq!(
        ingest.discovery_sources,
        vec![DiscoverySource::JsonLd, DiscoverySource::Homepage]
    );
    assert_eq!(ingest.pages_planned, 3);
    assert_eq!(ingest.pages_used, 3);
    assert_eq!(
        result.pages.iter().map(|p| p.url.as_str()).collect::<Vec<_>>(),
        vec![ROOT, "https://shop.test/about-us", "https://shop.test/contact"]
    );
    assert_eq!(fetcher.count("https://shop.test/gallery"), 0);
    assert_eq!(fetcher.count(ROOT), 1);
    assert!(result
        .discovered_urls
        .contains(&"https://shop.test/gallery".to_string()));
    assert_eq!(result.outcome, IngestionOutcome::Success);
}

#[tokio::test(start_paused = true)]
async fn second_run_reuses_cache() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let fetcher = ScriptedFetcher::new()
        .page("https://shop.test/sitemap.xml", &sitemap(&["/about", "/faq"]))
        .page(ROOT, &body("Home"))
        .page("https://shop.test/about", &body("About"))
        .page("https://shop.test/faq", &body("FAQ"));

    let first = ingest(&store, &fetcher, options(IngestionMode::Light)).await;
    let second = ingest(&store, &fetcher, options(IngestionMode::Light)).await;

    assert_eq!(first.evidence.ingest.cache_misses, 3);
    assert_eq!(first.evidence.ingest.cache_hits, 0);
    assert_eq!(
        second.evidence.ingest.cache_hits,
        first.evidence.ingest.cache_misses
    );
    assert_eq!(second.evidence.ingest.cache_misses, 0);
    assert_eq!(second.evidence.ingest.pages_fetched, 0);
    assert_eq!(fetcher.count("https://shop.test/about"), 1);
    assert!(second.pages.is_empty());
    assert_eq!(second.outcome, IngestionOutcome::Error);
    assert_eq!(second.blocked_reason.as_deref(), Some(NO_USABLE_PAGES));

    let forced = ingest(
        &store,
        &fetcher,
        IngestionOptions {
            force_refresh: true,
            ..options(IngestionMode::Light)
        },
    )
    .await;
    assert_eq!(forced.evidence.ingest.cache_hits, 0);
    assert_eq!(forced.evidence.ingest.cache_misses, 3);
    assert_eq!(fetcher.count("https://shop.test/about"), 2);
    assert_eq!(forced.outcome, IngestionOutcome::Success);
}

#[tokio::test(start_paused = true)]
async fn crawl_delay_paces_requests() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let fetcher = ScriptedFetcher::new()
        .page("https://shop.test/robots.txt", "User-agent: *\nCrawl-delay: 5\n")
        .page("https://shop.test/sitemap.xml", &sitemap(&["/about", "/faq"]))
        .page(ROOT, &body("Home"))
        .page("https://shop.test/about", &body("About"))
        .page("https://shop.test/faq", &body("FAQ"));

    let result = ingest(&store, &fetcher, options(IngestionMode::Light)).await;

    assert_eq!(result.outcome, IngestionOutcome::Success);
    assert_eq!(result.evidence.ingest.duration_ms, 10_000);
    let risk = store.get_domain_risk("shop.test").await.unwrap().unwrap();
    assert_eq!(risk.friction_count, 0);
}

#[tokio::test(start_paused = true)]
async fn oversized_crawl_delay_is_capped() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let fetcher = ScriptedFetcher::new()
        .page("https://shop.test/robots.txt", "User-agent: *\nCrawl-delay: 86400\n")
        .page("https://shop.test/sitemap.xml", &sitemap(&["/about", "/faq"]))
        .page(ROOT, &body("Home"))
        .page("https://shop.test/about", &body("About"))
        .page("https://shop.test/faq", &body("FAQ"));

    let result = ingest(&store, &fetcher, options(IngestionMode::Light)).await;

    assert_eq!(result.outcome, IngestionOutcome::Success);
    assert_eq!(result.evidence.ingest.pages_used, 3);
    assert_eq!(result.evidence.ingest.duration_ms, 60_000);
    let risk = store.get_domain_risk("shop.test").await.unwrap().unwrap();
    assert!(risk.recommended_delay_ms <= 30_000);
}

#[tokio::test(start_paused = true)]
async fn cached_homepage_is_not_reparsed_for_links() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let home = format!(
        r#"<html><body><a href="/about">About</a><a href="/contact">Contact</a>{}</body></html>"#,
        body("Home")
    );
    let fetcher = ScriptedFetcher::new()
        .page(ROOT, &home)
        .page("https://shop.test/about", &body("About"))
        .page("https://shop.test/contact", &body("Contact"));

    let first = ingest(&store, &fetcher, options(IngestionMode::Light)).await;
    assert_eq!(first.evidence.ingest.cache_misses, 3);
    assert_eq!(first.evidence.ingest.pages_used, 3);

    // Links are only taken from a freshly fetched homepage, so a cached
    // root plans nothing beyond itself.
    let second = ingest(&store, &fetcher, options(IngestionMode::Light)).await;
    let ingest = &second.evidence.ingest;
    assert_eq!(ingest.cache_hits, 1);
    assert_eq!(ingest.cache_misses, 0);
    assert_eq!(ingest.pages_planned, 1);
    assert_eq!(fetcher.count(ROOT), 1);
    assert_eq!(fetcher.count("https://shop.test/about"), 1);
    assert_eq!(second.outcome, IngestionOutcome::Error);
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_run_keeps_partial_evidence() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let fetcher = ScriptedFetcher::new()
        .page("https://shop.test/sitemap.xml", &sitemap(&["/about", "/faq"]))
        .page(ROOT, &body("Home"))
        .page("https://shop.test/about", &body("About"))
        .page("https://shop.test/faq", &body("FAQ"));

    let cancel = tokio_util::sync::CancellationToken::new();
    let trigger = cancel.clone();
    let messages = Arc::new(Mutex::new(Vec::new()));
    let seen = messages.clone();

    let result = ingest(
        &store,
        &fetcher,
        IngestionOptions {
            cancel: Some(cancel),
            on_status: Some(Arc::new(move |message: &str| {
                seen.lock().unwrap().push(message.to_string());
                if message.starts_with("Fetching 2/") {
                    trigger.cancel();
                }
            })),
            ..options(IngestionMode::Light)
        },
    )
    .await;

    assert_eq!(result.outcome, IngestionOutcome::Partial);
    assert_eq!(result.error.as_deref(), Some("cancelled"));
    assert_eq!(result.evidence.ingest.pages_used, 1);
    assert_eq!(fetcher.count("https://shop.test/about"), 0);
    let messages = messages.lock().unwrap();
    assert_eq!(messages[0], "Fetching robots.txt");
    assert!(messages.iter().any(|m| m == "Cancelled"));

    let run = stored_run(store.as_ref(), &result).await;
    assert_eq!(run.outcome, IngestionOutcome::Partial);
    assert_eq!(run.last_error.as_deref(), Some("cancelled"));
}

#[tokio::test(start_paused = true)]
async fn invalid_root_url_is_an_error_result() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let fetcher = ScriptedFetcher::new();

    let result = run_ingestion(
        store.clone(),
        &fetcher,
        &IngestSettings::default(),
        "bakery",
        "ftp://shop.test",
        options(IngestionMode::Light),
    )
    .await;

    assert_eq!(result.outcome, IngestionOutcome::Error);
    assert!(result.error.unwrap().contains("unsupported scheme"));
    assert!(fetcher.requests().is_empty());
    let run = store
        .get_ingestion_run(result.run_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.outcome, IngestionOutcome::Error);
}

#[tokio::test(start_paused = true)]
async fn panicking_fetcher_is_contained() {
    let store = Arc::new(InMemoryIngestionStore::new());
    let fetcher = ScriptedFetcher::new().route(ROOT, Reply::Panic);

    let result = ingest(&store, &fetcher, options(IngestionMode::Light)).await;

    assert_eq!(result.outcome, IngestionOutcome::Error);
    assert!(!result.success);
    assert!(result.error.as_ref().unwrap().contains("scripted fetcher exploded"));
    let run = stored_run(store.as_ref(), &result).await;
    assert!(run.is_complete());
}

/// Store whose cache lookups always fail.
struct BrokenCacheStore {
    inner: InMemoryIngestionStore,
}

#[async_trait]
impl IngestionStore for BrokenCacheStore {
    async fn create_ingestion_run(&self, run: &IngestionRun) -> StoreResult<i64> {
        self.inner.create_ingestion_run(run).await
    }
    async fn complete_ingestion_run(&self, run: &IngestionRun) -> StoreResult<()> {
        self.inner.complete_ingestion_run(run).await
    }
    async fn get_ingestion_run(&self, id: i64) -> StoreResult<Option<IngestionRun>> {
        self.inner.get_ingestion_run(id).await
    }
    async fn list_ingestion_runs(
        &self,
        business_slug: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<IngestionRun>> {
        self.inner.list_ingestion_runs(business_slug, limit).await
    }
    async fn get_domain_risk(
        &self,
        hostname: &str,
    ) -> StoreResult<Option<site_ingest::models::DomainRisk>> {
        self.inner.get_domain_risk(hostname).await
    }
    async fn update_domain_risk(
        &self,
        hostname: &str,
        delay_ms: u64,
        policy: &site_ingest::models::RiskPolicy,
    ) -> StoreResult<site_ingest::models::DomainRisk> {
        self.inner.update_domain_risk(hostname, delay_ms, policy).await
    }
    async fn record_domain_friction(
        &self,
        hostname: &str,
        status: u16,
        policy: &site_ingest::models::RiskPolicy,
    ) -> StoreResult<site_ingest::models::DomainRisk> {
        self.inner.record_domain_friction(hostname, status, policy).await
    }
    async fn record_domain_success(
        &self,
        hostname: &str,
        policy: &site_ingest::models::RiskPolicy,
    ) -> StoreResult<site_ingest::models::DomainRisk> {
        self.inner.record_domain_success(hostname, policy).await
    }
    async fn list_domain_risks(
        &self,
        limit: usize,
    ) -> StoreResult<Vec<site_ingest::models::DomainRisk>> {
        self.inner.list_domain_risks(limit).await
    }
    async fn get_valid_url_fetch_cache(
        &self,
        _url: &str,
        _now: chrono::DateTime<Utc>,
    ) -> StoreResult<Option<site_ingest::models::UrlFetchCacheEntry>> {
        Err(StoreError::Unavailable("cache offline".to_string()))
    }
    async fn upsert_url_fetch_cache(
        &self,
        entry: &site_ingest::models::UrlFetchCacheEntry,
    ) -> StoreResult<()> {
        self.inner.upsert_url_fetch_cache(entry).await
    }
    async fn purge_expired_url_cache(&self, now: chrono::DateTime<Utc>) -> StoreResult<u64> {
        self.inner.purge_expired_url_cache(now).await
    }
}

#[tokio::test(start_paused = true)]
async fn store_failure_becomes_error_outcome() {
    let inner = InMemoryIngestionStore::new();
    let store: SharedStore = Arc::new(BrokenCacheStore {
        inner: inner.clone(),
    });
    let fetcher = ScriptedFetcher::new().page(ROOT, &body("Home"));

    let result = run_ingestion(
        store,
        &fetcher,
        &IngestSettings::default(),
        "bakery",
        "https://shop.test",
        options(IngestionMode::Light),
    )
    .await;

    assert_eq!(result.outcome, IngestionOutcome::Error);
    assert!(result.error.as_deref().unwrap().contains("cache offline"));
    assert_eq!(fetcher.count(ROOT), 0);

    let run = inner
        .get_ingestion_run(result.run_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.outcome, IngestionOutcome::Error);
    assert!(run.last_error.unwrap().contains("cache offline"));
}

#[tokio::test]
async fn sqlite_store_persists_runs_and_risk() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteIngestionStore::open(&dir.path().join("ingest.db"))
        .await
        .unwrap();
    let shared: SharedStore = Arc::new(store.clone());
    let fetcher = ScriptedFetcher::new().route(ROOT, Reply::Page(503, "maintenance".to_string()));

    let result = run_ingestion(
        shared,
        &fetcher,
        &IngestSettings::default(),
        "bakery",
        "https://shop.test",
        options(IngestionMode::Light),
    )
    .await;

    assert_eq!(result.outcome, IngestionOutcome::Error);
    assert_eq!(result.evidence.ingest.friction_signals, vec![format!("503:{}", ROOT)]);

    let reopened = SqliteIngestionStore::open(&dir.path().join("ingest.db"))
        .await
        .unwrap();
    let runs = reopened.list_ingestion_runs(Some("bakery"), 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].outcome, IngestionOutcome::Error);
    assert_eq!(runs[0].friction_signals, result.evidence.ingest.friction_signals);
    assert_eq!(runs[0].trace_id, result.evidence.trace_id);

    let risk = reopened.get_domain_risk("shop.test").await.unwrap().unwrap();
    assert_eq!(risk.friction_count, 1);
    assert_eq!(risk.last_friction_status, Some(503));
}
