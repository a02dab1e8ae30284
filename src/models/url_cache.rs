//! URL fetch cache entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fingerprint of a previously fetched URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlFetchCacheEntry {
    pub url: String,
    pub hostname: String,
    /// Hex-encoded SHA-256 of the body.
    pub content_hash: String,
    pub content_length: u64,
    pub last_status: u16,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UrlFetchCacheEntry {
    /// Whether the entry may still be honored at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
