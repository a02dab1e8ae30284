//! robots.txt parsing.

use url::Url;

/// What robots.txt told us about the site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsFindings {
    pub found: bool,
    /// `Sitemap:` URLs, collected regardless of user-agent group.
    pub sitemaps: Vec<String>,
    /// `Disallow:` path prefixes from groups matching `*` or our crawler.
    pub disallowed: Vec<String>,
    pub crawl_delay_secs: Option<f64>,
}

impl RobotsFindings {
    pub fn not_found() -> Self {
        Self::default()
    }

    /// Parse a robots.txt body.
    ///
    /// `crawler` is the product token of our user agent. Consecutive
    /// `User-agent:` lines form one group. A `Disallow: /` value is ignored.
    pub fn parse(body: &str, crawler: &str) -> Self {
        let mut findings = Self {
            found: true,
            ..Self::default()
        };

        let mut in_group = false;
        let mut previous_was_agent = false;

        for raw in body.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                let matches = value == "*" || value.eq_ignore_ascii_case(crawler);
                in_group = if previous_was_agent {
                    in_group || matches
                } else {
                    matches
                };
                previous_was_agent = true;
                continue;
            }
            previous_was_agent = false;

            match key.as_str() {
                "sitemap" => {
                    if !value.is_empty() && !findings.sitemaps.iter().any(|s| s == value) {
                        findings.sitemaps.push(value.to_string());
                    }
                }
                "disallow" if in_group => {
                    if !value.is_empty()
                        && value != "/"
                        && !findings.disallowed.iter().any(|d| d == value)
                    {
                        findings.disallowed.push(value.to_string());
                    }
                }
                "crawl-delay" if in_group => {
                    if findings.crawl_delay_secs.is_none() {
                        findings.crawl_delay_secs =
                            value.parse::<f64>().ok().filter(|d| d.is_finite() && *d > 0.0);
                    }
                }
                _ => {}
            }
        }

        findings
    }

    /// Whether a URL survives the disallow filter.
    ///
    /// Unparseable URLs are not allowed.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let path = parsed.path();
        !self.disallowed.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Crawl-delay in milliseconds, if declared.
    pub fn crawl_delay_ms(&self) -> Option<u64> {
        self.crawl_delay_secs.map(|secs| (secs * 1000.0).round() as u64)
    }
}
