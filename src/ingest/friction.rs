//! Friction classification for fetched responses.

use std::fmt;

/// Statuses that indicate the server is pushing back.
pub const FRICTION_STATUSES: [u16; 4] = [403, 429, 503, 451];

/// Body substrings (lower-case) that identify anti-bot interstitials.
pub const BOT_PROTECTION_SIGNATURES: &[&str] = &[
    "cloudflare",
    "captcha",
    "cf-ray",
    "challenge-running",
    "just a moment",
    "ddos-guard",
    "checking your browser",
    "access denied",
    "blocked",
];

/// Only the start of the body is inspected for signatures.
pub const SIGNATURE_WINDOW_CHARS: usize = 5000;

/// Why a response counts as friction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrictionKind {
    /// Anti-bot page detected; always ends the run.
    BotProtection { signature: &'static str },
    /// Throttling or refusal status.
    Status(u16),
    /// No HTTP status: timeout, DNS or connection failure.
    Network,
}

impl FrictionKind {
    pub fn is_bot_protection(&self) -> bool {
        matches!(self, FrictionKind::BotProtection { .. })
    }
}

impl fmt::Display for FrictionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrictionKind::BotProtection { signature } => {
                write!(f, "bot protection (\"{}\")", signature)
            }
            FrictionKind::Status(status) => write!(f, "HTTP {}", status),
            FrictionKind::Network => write!(f, "network failure"),
        }
    }
}

/// First bot-protection signature found in the inspected window of `body`.
pub fn detect_bot_protection(body: &str) -> Option<&'static str> {
    let window: String = body
        .chars()
        .take(SIGNATURE_WINDOW_CHARS)
        .collect::<String>()
        .to_lowercase();
    BOT_PROTECTION_SIGNATURES
        .iter()
        .copied()
        .find(|signature| window.contains(signature))
}

/// Classify a response. Status 0 stands for a request that never got one.
///
/// A signature match wins over the status, even on 200.
pub fn classify(status: u16, body: &str) -> Option<FrictionKind> {
    if let Some(signature) = detect_bot_protection(body) {
        return Some(FrictionKind::BotProtection { signature });
    }
    if status == 0 {
        return Some(FrictionKind::Network);
    }
    if FRICTION_STATUSES.contains(&status) {
        return Some(FrictionKind::Status(status));
    }
    None
}

/// Friction signal recorded in evidence: `"<status>:<url>"`.
pub fn friction_signal(status: u16, url: &str) -> String {
    format!("{}:{}", status, url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_on_ok_status() {
        let kind = classify(200, "<title>Just a moment...</title> Checking your browser").unwrap();
        assert!(kind.is_bot_protection());
        assert_eq!(
            kind,
            FrictionKind::BotProtection {
                signature: "just a moment"
            }
        );
    }

    #[test]
    fn test_friction_statuses() {
        for status in FRICTION_STATUSES {
            assert_eq!(classify(status, ""), Some(FrictionKind::Status(status)));
        }
        assert_eq!(classify(0, ""), Some(FrictionKind::Network));
        assert_eq!(classify(200, "<html>welcome</html>"), None);
        assert_eq!(classify(404, "not found"), None);
        assert_eq!(classify(500, "oops"), None);
    }

    #[test]
    fn test_signature_beats_status() {
        let kind = classify(403, "Access Denied").unwrap();
        assert!(kind.is_bot_protection());
    }

    #[test]
    fn test_signature_window() {
        let mut body = "a".repeat(SIGNATURE_WINDOW_CHARS);
        body.push_str("captcha");
        assert_eq!(classify(200, &body), None);

        let body = format!("{}captcha", "é".repeat(SIGNATURE_WINDOW_CHARS - 7));
        assert!(classify(200, &body).is_some());
    }

    #[test]
    fn test_signal_format() {
        assert_eq!(friction_signal(429, "https://x.test/a"), "429:https://x.test/a");
        assert_eq!(FrictionKind::Status(503).to_string(), "HTTP 503");
    }
}
