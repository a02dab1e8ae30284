//! Record store for ingestion state.
//!
//! The pipeline consults and updates three kinds of records through the
//! [`IngestionStore`] trait: run records, per-hostname risk, and URL fetch
//! cache entries. Backends:
//! - In-memory (tests, one-off CLI runs)
//! - SQLite (persistent, safe for concurrent runs on one host)

mod memory;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{DomainRisk, IngestionRun, RiskPolicy, UrlFetchCacheEntry};

pub use memory::InMemoryIngestionStore;
pub use sqlite::SqliteIngestionStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Run not found: {0}")]
    RunNotFound(i64),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Type alias for a shared store handle.
pub type SharedStore = Arc<dyn IngestionStore>;

/// Storage collaborator consulted and updated by the crawler.
///
/// Risk updates must be atomic per hostname: two runs recording friction
/// against the same host concurrently must both be counted.
#[async_trait]
pub trait IngestionStore: Send + Sync {
    /// Persist a new (in-progress) run and return its id.
    async fn create_ingestion_run(&self, run: &IngestionRun) -> StoreResult<i64>;

    /// Overwrite a run with its finalized state.
    async fn complete_ingestion_run(&self, run: &IngestionRun) -> StoreResult<()>;

    /// Fetch a run by id.
    async fn get_ingestion_run(&self, id: i64) -> StoreResult<Option<IngestionRun>>;

    /// Most recent runs first, optionally for one business.
    async fn list_ingestion_runs(
        &self,
        business_slug: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<IngestionRun>>;

    /// Risk record for a hostname, if one exists.
    async fn get_domain_risk(&self, hostname: &str) -> StoreResult<Option<DomainRisk>>;

    /// Set the recommended delay (kept within the policy bounds), creating the record if needed.
    async fn update_domain_risk(
        &self,
        hostname: &str,
        delay_ms: u64,
        policy: &RiskPolicy,
    ) -> StoreResult<DomainRisk>;

    /// Atomically apply one friction event and return the updated record.
    async fn record_domain_friction(
        &self,
        hostname: &str,
        status: u16,
        policy: &RiskPolicy,
    ) -> StoreResult<DomainRisk>;

    /// Atomically apply one clean fetch and return the updated record.
    async fn record_domain_success(
        &self,
        hostname: &str,
        policy: &RiskPolicy,
    ) -> StoreResult<DomainRisk>;

    /// Riskiest hostnames first.
    async fn list_domain_risks(&self, limit: usize) -> StoreResult<Vec<DomainRisk>>;

    /// Cache entry for a URL, only if it has not expired at `now`.
    async fn get_valid_url_fetch_cache(
        &self,
        url: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<UrlFetchCacheEntry>>;

    /// Insert or replace the cache entry for `entry.url`.
    async fn upsert_url_fetch_cache(&self, entry: &UrlFetchCacheEntry) -> StoreResult<()>;

    /// Delete entries expired at `now`; returns the number removed.
    async fn purge_expired_url_cache(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}
