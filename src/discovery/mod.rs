//! Candidate URL discovery.
//!
//! robots.txt and sitemaps are fetched up front; homepage links and JSON-LD
//! are extracted from the first fetched page by the scheduler. Discovery
//! failures are downgraded to "not found" and never abort a run.

mod html;
mod robots;
mod sitemap;

pub use html::{extract_json_ld, extract_links, JsonLdFindings, MAX_HOMEPAGE_LINKS};
pub use robots::RobotsFindings;
pub use sitemap::{
    extract_locs, filter_page_urls, is_sitemap_index, SitemapFindings, MAX_INDEX_URLS,
    MAX_NESTED_SITEMAPS, MAX_SITEMAP_CANDIDATES, MAX_SITEMAP_URLS,
};

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::http_client::{robots_token, PageFetcher};

/// Links found on the homepage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HomepageFindings {
    pub found: bool,
    pub links: Vec<String>,
}

/// Everything discovery learned during one run.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    pub robots: Option<RobotsFindings>,
    pub sitemap: Option<SitemapFindings>,
    pub json_ld: Option<JsonLdFindings>,
    pub homepage: Option<HomepageFindings>,
}

impl DiscoveryResult {
    /// Disallow filter; everything is allowed when robots.txt was not found.
    pub fn is_allowed(&self, url: &str) -> bool {
        self.robots.as_ref().map_or(true, |r| r.is_allowed(url))
    }
}

/// Fetches robots.txt and sitemaps for a root URL.
pub struct DiscoveryEngine<'a> {
    fetcher: &'a dyn PageFetcher,
    robots_timeout: Duration,
    sitemap_timeout: Duration,
}

impl<'a> DiscoveryEngine<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        robots_timeout: Duration,
        sitemap_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            robots_timeout,
            sitemap_timeout,
        }
    }

    /// Fetch and parse `/robots.txt` on the root's origin.
    pub async fn fetch_robots(&self, root: &Url) -> RobotsFindings {
        let Ok(robots_url) = root.join("/robots.txt") else {
            return RobotsFindings::not_found();
        };
        debug!("Checking robots.txt at {}", robots_url);

        match self.get_ok(robots_url.as_str(), self.robots_timeout).await {
            Some(body) => {
                RobotsFindings::parse(&body, &robots_token(self.fetcher.user_agent()))
            }
            None => RobotsFindings::not_found(),
        }
    }

    /// Fetch sitemap URLs for the root's host.
    ///
    /// Tries robots-declared sitemaps (or `/sitemap.xml`), up to
    /// [`MAX_SITEMAP_CANDIDATES`]. The first candidate yielding a URL wins.
    pub async fn fetch_sitemap(&self, root: &Url, robots: &RobotsFindings) -> SitemapFindings {
        let Some(hostname) = root.host_str() else {
            return SitemapFindings::default();
        };

        let candidates: Vec<String> = if robots.sitemaps.is_empty() {
            root.join("/sitemap.xml")
                .map(|u| vec![u.to_string()])
                .unwrap_or_default()
        } else {
            robots.sitemaps.clone()
        };

        for candidate in candidates.iter().take(MAX_SITEMAP_CANDIDATES) {
            debug!("Fetching sitemap: {}", candidate);
            let Some(body) = self.get_ok(candidate, self.sitemap_timeout).await else {
                continue;
            };

            let urls = if is_sitemap_index(&body) {
                self.fetch_nested(&body, hostname).await
            } else {
                filter_page_urls(extract_locs(&body), hostname, MAX_SITEMAP_URLS)
            };

            debug!("Sitemap {} yielded {} URLs", candidate, urls.len());
            if !urls.is_empty() {
                return SitemapFindings { found: true, urls };
            }
        }

        SitemapFindings::default()
    }

    async fn fetch_nested(&self, index_body: &str, hostname: &str) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();

        for nested in extract_locs(index_body).into_iter().take(MAX_NESTED_SITEMAPS) {
            if urls.len() >= MAX_INDEX_URLS {
                break;
            }
            debug!("Fetching nested sitemap: {}", nested);
            let Some(body) = self.get_ok(&nested, self.sitemap_timeout).await else {
                continue;
            };
            for url in filter_page_urls(extract_locs(&body), hostname, MAX_INDEX_URLS) {
                if urls.len() >= MAX_INDEX_URLS {
                    break;
                }
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }

        urls
    }

    async fn get_ok(&self, url: &str, timeout: Duration) -> Option<String> {
        match self.fetcher.fetch(url, timeout).await {
            Ok(response) if response.is_success() => Some(response.body),
            Ok(response) => {
                debug!("{} returned {}", url, response.status);
                None
            }
            Err(e) => {
                debug!("Failed to fetch {}: {}", url, e);
                None
            }
        }
    }
}
