//! Declared crawler identity.

/// Token matched against `User-agent:` lines in robots.txt.
pub const CRAWLER_NAME: &str = "SiteIngestBot";

/// Sent on every discovery and page request.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (compatible; SiteIngestBot/0.3; +https://siteingest.dev/bot)";

/// Resolve user agent from config value.
/// - None => declared crawler user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None => USER_AGENT.to_string(),
        Some(custom) if custom.trim().is_empty() => USER_AGENT.to_string(),
        Some(custom) => custom.to_string(),
    }
}

/// Product token of a user agent, for robots.txt group matching.
///
/// `"Mozilla/5.0 (compatible; SiteIngestBot/0.3; ...)"` yields `"SiteIngestBot"`;
/// a bare `"MyBot/1.0"` yields `"MyBot"`.
pub fn robots_token(user_agent: &str) -> String {
    let inner = user_agent
        .split_once("compatible;")
        .map(|(_, rest)| rest)
        .unwrap_or(user_agent);
    inner
        .trim()
        .split(['/', ';', ' ', ')'])
        .find(|part| !part.is_empty())
        .unwrap_or(CRAWLER_NAME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent_default() {
        let ua = resolve_user_agent(None);
        assert!(ua.contains(CRAWLER_NAME));
        assert!(ua.contains("https://"));
    }

    #[test]
    fn test_resolve_user_agent_custom() {
        assert_eq!(resolve_user_agent(Some("MyBot/1.0")), "MyBot/1.0");
        assert_eq!(resolve_user_agent(Some("  ")), USER_AGENT);
    }

    #[test]
    fn test_robots_token() {
        assert_eq!(robots_token(USER_AGENT), CRAWLER_NAME);
        assert_eq!(robots_token("MyBot/1.0 (+https://x.test)"), "MyBot");
    }
}
