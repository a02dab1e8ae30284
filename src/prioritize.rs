//! Budget-bounded URL selection.
//!
//! Two selectors share one category table: a sitemap sampler that mixes
//! priority pages with a random sample, and a deterministic scorer for links
//! found on the homepage.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use url::Url;

/// Percentage of the sitemap budget reserved for category matches.
pub const PRIORITY_PERCENT: usize = 70;

/// Bonus for shallow pages in homepage scoring.
const SHALLOW_BONUS: u32 = 2;
const SHALLOW_MAX_SEGMENTS: usize = 4;

/// Page categories, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCategory {
    About,
    Services,
    Products,
    Pricing,
    Contact,
    Faq,
    Testimonials,
    BlogPost,
    BlogIndex,
}

impl PageCategory {
    const ALL: [PageCategory; 9] = [
        PageCategory::About,
        PageCategory::Services,
        PageCategory::Products,
        PageCategory::Pricing,
        PageCategory::Contact,
        PageCategory::Faq,
        PageCategory::Testimonials,
        PageCategory::BlogPost,
        PageCategory::BlogIndex,
    ];

    /// Weight in homepage-link scoring.
    pub fn homepage_weight(&self) -> u32 {
        match self {
            PageCategory::About => 10,
            PageCategory::Services | PageCategory::Products => 9,
            PageCategory::Pricing => 8,
            PageCategory::Contact => 7,
            PageCategory::Faq => 6,
            PageCategory::Testimonials => 5,
            PageCategory::BlogIndex => 3,
            PageCategory::BlogPost => 0,
        }
    }

    /// Whether pages in this category are priority picks from a sitemap.
    pub fn is_sitemap_priority(&self) -> bool {
        !matches!(self, PageCategory::BlogIndex)
    }

    fn pattern(&self) -> &'static Regex {
        &CATEGORY_PATTERNS[*self as usize]
    }

    /// First category whose pattern matches a lower-cased URL path.
    pub fn classify_path(path: &str) -> Option<PageCategory> {
        let path = path.to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.pattern().is_match(&path))
    }
}

static CATEGORY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(^|/)(about|about-us|team|our-team|who-we-are|our-story|company)(/|$)",
        r"(^|/)(services?|what-we-do|solutions)(/|$)",
        r"(^|/)(products?|shop|store|catalog|catalogue|collections?|menu)(/|$)",
        r"(^|/)(pricing|prices|plans|rates)(/|$)",
        r"(^|/)(contact|contact-us|locations?|find-us)(/|$)",
        r"(^|/)(faqs?|help|support)(/|$)",
        r"(^|/)(testimonials?|reviews?|case-studies)(/|$)",
        r"(^|/)(blog|news|articles?|posts?)/[^/]+/?$",
        r"(^|/)(blog|news|articles?)/?$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid category regex"))
    .collect()
});

/// Category of a URL, or `None` for uncategorised or malformed URLs.
pub fn classify_url(url: &str) -> Option<PageCategory> {
    Url::parse(url)
        .ok()
        .and_then(|u| PageCategory::classify_path(u.path()))
}

/// Choose up to `budget` URLs from a sitemap.
///
/// Category matches fill at most [`PRIORITY_PERCENT`] of the budget, in category
/// order. The rest is a uniform sample of uncategorised URLs, topped up with
/// leftover category matches when there are too few. Malformed URLs are
/// skipped.
pub fn sample_sitemap_urls<R: Rng + ?Sized>(
    urls: &[String],
    budget: usize,
    rng: &mut R,
) -> Vec<String> {
    let mut priority: Vec<(PageCategory, &String)> = Vec::new();
    let mut rest: Vec<&String> = Vec::new();

    for url in urls {
        let Ok(parsed) = Url::parse(url) else {
            continue;
        };
        match PageCategory::classify_path(parsed.path()) {
            Some(category) if category.is_sitemap_priority() => priority.push((category, url)),
            _ => rest.push(url),
        }
    }
    // Stable: ties keep sitemap order.
    priority.sort_by_key(|(category, _)| *category as usize);

    let priority_cap = budget * PRIORITY_PERCENT / 100;
    let take_priority = priority.len().min(priority_cap);

    let mut selected: Vec<String> = priority[..take_priority]
        .iter()
        .map(|(_, url)| (*url).clone())
        .collect();

    let random_slots = (budget - selected.len()).min(rest.len());
    let mut picks: Vec<usize> = rand::seq::index::sample(rng, rest.len(), random_slots).into_vec();
    picks.sort_unstable();
    selected.extend(picks.into_iter().map(|i| rest[i].clone()));

    for (_, url) in priority[take_priority..].iter() {
        if selected.len() >= budget {
            break;
        }
        selected.push((*url).clone());
    }

    selected
}

/// Homepage score for a URL: category weight plus a shallow-path bonus.
pub fn score_link(url: &str) -> Option<u32> {
    let parsed = Url::parse(url).ok()?;
    let weight = PageCategory::classify_path(parsed.path())
        .map(|c| c.homepage_weight())
        .unwrap_or(0);
    let depth = parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).count())
        .unwrap_or(0);
    let bonus = if depth <= SHALLOW_MAX_SEGMENTS {
        SHALLOW_BONUS
    } else {
        0
    };
    Some(weight + bonus)
}

/// Rank homepage links by score and keep the top `limit`.
///
/// Deterministic: equal scores keep their original order.
pub fn prioritize_homepage_links(links: &[String], limit: usize) -> Vec<String> {
    let mut scored: Vec<(u32, &String)> = links
        .iter()
        .filter_map(|link| score_link(link).map(|score| (score, link)))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, link)| link.clone())
        .collect()
}
