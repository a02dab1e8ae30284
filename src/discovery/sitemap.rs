//! Sitemap and sitemap-index parsing.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Cap for URLs taken from a flat sitemap.
pub const MAX_SITEMAP_URLS: usize = 200;

/// Cap for URLs merged from nested sitemaps of an index.
pub const MAX_INDEX_URLS: usize = 100;

/// Nested sitemaps visited per index.
pub const MAX_NESTED_SITEMAPS: usize = 3;

/// Candidate sitemap documents tried per run.
pub const MAX_SITEMAP_CANDIDATES: usize = 2;

static LOC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<loc>\s*(.*?)\s*</loc>").expect("valid loc regex"));

/// Sitemap discovery result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SitemapFindings {
    pub found: bool,
    pub urls: Vec<String>,
}

/// Whether an XML body is a sitemap index rather than a URL set.
pub fn is_sitemap_index(xml: &str) -> bool {
    xml.to_ascii_lowercase().contains("<sitemapindex")
}

/// Extract `<loc>` values in document order, XML entities unescaped.
pub fn extract_locs(xml: &str) -> Vec<String> {
    LOC_RE
        .captures_iter(xml)
        .filter_map(|cap| cap.get(1))
        .map(|m| unescape_xml(m.as_str()))
        .filter(|loc| !loc.is_empty())
        .collect()
}

/// Keep same-host, fragment-free page URLs, deduped, up to `cap`.
pub fn filter_page_urls(locs: Vec<String>, hostname: &str, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for loc in locs {
        if urls.len() >= cap {
            break;
        }
        let Ok(parsed) = Url::parse(&loc) else {
            continue;
        };
        if parsed.fragment().is_some() || !same_host(&parsed, hostname) {
            continue;
        }
        if seen.insert(loc.clone()) {
            urls.push(loc);
        }
    }

    urls
}

pub(crate) fn same_host(url: &Url, hostname: &str) -> bool {
    url.host_str()
        .is_some_and(|host| host.eq_ignore_ascii_case(hostname))
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
