//! Link and structured-data extraction from fetched HTML.
//!
//! The scheduler only sees `extract_links` and `extract_json_ld`.

use std::collections::HashSet;

use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use super::sitemap::same_host;

/// Cap for links taken from one page.
pub const MAX_HOMEPAGE_LINKS: usize = 100;

const SKIPPED_PREFIXES: &[&str] = &["mailto:", "tel:", "#", "javascript:"];

/// First JSON-LD block on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonLdFindings {
    pub found: bool,
    /// `@type` of the top-level object (or of the first `@graph` node).
    pub ld_type: Option<String>,
    pub data: Value,
}

/// Same-host links of a page, resolved against `base`, fragments stripped.
///
/// Returns at most [`MAX_HOMEPAGE_LINKS`] deduped absolute URLs in document order.
pub fn extract_links(html: &str, base: &Url) -> Vec<String> {
    let Some(hostname) = base.host_str() else {
        return Vec::new();
    };
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        if links.len() >= MAX_HOMEPAGE_LINKS {
            break;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        let lower = href.to_ascii_lowercase();
        if href.is_empty() || SKIPPED_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            continue;
        }

        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") || !same_host(&resolved, hostname) {
            continue;
        }
        resolved.set_fragment(None);

        let link = resolved.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }

    links
}

/// Parse the first `<script type="application/ld+json">` block.
///
/// Returns `None` when there is no block or it is not valid JSON.
pub fn extract_json_ld(html: &str) -> Option<JsonLdFindings> {
    let selector = Selector::parse("script[type]").ok()?;
    let document = Html::parse_document(html);

    let script = document.select(&selector).find(|el| {
        el.value()
            .attr("type")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
    })?;

    let text: String = script.text().collect();
    let data: Value = serde_json::from_str(text.trim()).ok()?;
    let ld_type = ld_type_of(&data);

    Some(JsonLdFindings {
        found: true,
        ld_type,
        data,
    })
}

fn ld_type_of(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.first().and_then(ld_type_of),
        Value::Object(map) => match map.get("@type") {
            Some(Value::String(t)) => Some(t.clone()),
            Some(Value::Array(types)) => types.first().and_then(|t| t.as_str()).map(String::from),
            _ => map
                .get("@graph")
                .and_then(|g| g.as_array())
                .and_then(|nodes| nodes.first())
                .and_then(ld_type_of),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://shop.example.com/").unwrap()
    }

    #[test]
    fn test_extract_links_filters_and_resolves() {
        let html = r##"
            <html><body>
              <a href="/about">About</a>
              <a href="services/">Services</a>
              <a href="https://shop.example.com/contact#form">Contact</a>
              <a href="https://elsewhere.com/x">External</a>
              <a href="mailto:hi@example.com">Mail</a>
              <a href="tel:+1555">Call</a>
              <a href="#top">Top</a>
              <a href="JavaScript:void(0)">JS</a>
              <a href="/about">About again</a>
              <a>No href</a>
            </body></html>
        "##;
        assert_eq!(
            extract_links(html, &base()),
            vec![
                "https://shop.example.com/about",
                "https://shop.example.com/services/",
                "https://shop.example.com/contact",
            ]
        );
    }

    #[test]
    fn test_extract_links_cap() {
        let html: String = (0..150)
            .map(|i| format!("<a href=\"/p{}\">p</a>", i))
            .collect();
        assert_eq!(extract_links(&html, &base()).len(), MAX_HOMEPAGE_LINKS);
    }

    #[test]
    fn test_extract_json_ld() {
        let html = r#"<html><head>
            <script type="text/javascript">var x = 1;</script>
            <script type="application/ld+json">
              {"@context": "https://schema.org", "@type": "LocalBusiness", "name": "Acme"}
            </script>
            <script type="application/ld+json">{"@type": "WebSite"}</script>
        </head></html>"#;
        let found = extract_json_ld(html).unwrap();
        assert!(found.found);
        assert_eq!(found.ld_type.as_deref(), Some("LocalBusiness"));
        assert_eq!(found.data["name"], "Acme");
    }

    #[test]
    fn test_extract_json_ld_graph_and_invalid() {
        let graph = r#"<script type="application/ld+json">{"@graph": [{"@type": ["Organization", "Brand"]}]}</script>"#;
        assert_eq!(
            extract_json_ld(graph).unwrap().ld_type.as_deref(),
            Some("Organization")
        );

        let broken = r#"<script type="application/ld+json">{not json</script>"#;
        assert!(extract_json_ld(broken).is_none());
        assert!(extract_json_ld("<p>nothing</p>").is_none());
    }
}
