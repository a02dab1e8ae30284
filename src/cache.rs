//! URL fetch cache.

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::models::UrlFetchCacheEntry;
use crate::repository::{SharedStore, StoreResult};

/// Default time-to-live for cache entries.
pub const DEFAULT_CACHE_TTL_HOURS: i64 = 24;

/// Compute SHA-256 hash of content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Skips redundant fetches of recently seen URLs.
#[derive(Clone)]
pub struct UrlFetchCache {
    store: SharedStore,
    ttl: Duration,
    force_refresh: bool,
}

impl UrlFetchCache {
    pub fn new(store: SharedStore, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            force_refresh: false,
        }
    }

    /// Ignore existing entries on lookup; fresh fetches are still recorded.
    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// Non-expired entry for a URL. Always `None` when forcing a refresh.
    pub async fn get(&self, url: &str) -> StoreResult<Option<UrlFetchCacheEntry>> {
        if self.force_refresh {
            return Ok(None);
        }
        let entry = self.store.get_valid_url_fetch_cache(url, Utc::now()).await?;
        if entry.is_some() {
            debug!("Cache hit: {}", url);
        }
        Ok(entry)
    }

    /// Record a successful fetch, expiring after the TTL.
    pub async fn record(
        &self,
        url: &str,
        hostname: &str,
        status: u16,
        body: &str,
    ) -> StoreResult<UrlFetchCacheEntry> {
        let now = Utc::now();
        let entry = UrlFetchCacheEntry {
            url: url.to_string(),
            hostname: hostname.to_string(),
            content_hash: content_hash(body),
            content_length: body.len() as u64,
            last_status: status,
            fetched_at: now,
            expires_at: now + self.ttl,
        };
        self.store.upsert_url_fetch_cache(&entry).await?;
        Ok(entry)
    }

    /// Remove expired entries.
    pub async fn purge_expired(&self) -> StoreResult<u64> {
        self.store.purge_expired_url_cache(Utc::now()).await
    }
}
