//! In-memory record store for single-process operation.
//!
//! State is not persisted across restarts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{IngestionStore, StoreError, StoreResult};
use crate::models::{DomainRisk, IngestionRun, RiskPolicy, UrlFetchCacheEntry};

#[derive(Debug, Default)]
struct Tables {
    runs: Vec<IngestionRun>,
    risks: HashMap<String, DomainRisk>,
    cache: HashMap<String, UrlFetchCacheEntry>,
}

/// In-memory ingestion store.
#[derive(Clone, Default)]
pub struct InMemoryIngestionStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryIngestionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IngestionStore for InMemoryIngestionStore {
    async fn create_ingestion_run(&self, run: &IngestionRun) -> StoreResult<i64> {
        let mut tables = self.tables.write().await;
        let id = tables.runs.len() as i64 + 1;
        let mut run = run.clone();
        run.id = id;
        tables.runs.push(run);
        Ok(id)
    }

    async fn complete_ingestion_run(&self, run: &IngestionRun) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .runs
            .iter_mut()
            .find(|r| r.id == run.id)
            .ok_or(StoreError::RunNotFound(run.id))?;
        *slot = run.clone();
        Ok(())
    }

    async fn get_ingestion_run(&self, id: i64) -> StoreResult<Option<IngestionRun>> {
        let tables = self.tables.read().await;
        Ok(tables.runs.iter().find(|r| r.id == id).cloned())
    }

    async fn list_ingestion_runs(
        &self,
        business_slug: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<IngestionRun>> {
        let tables = self.tables.read().await;
        Ok(tables
            .runs
            .iter()
            .rev()
            .filter(|r| business_slug.map_or(true, |slug| r.business_slug == slug))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_domain_risk(&self, hostname: &str) -> StoreResult<Option<DomainRisk>> {
        let tables = self.tables.read().await;
        Ok(tables.risks.get(hostname).cloned())
    }

    async fn update_domain_risk(
        &self,
        hostname: &str,
        delay_ms: u64,
        policy: &RiskPolicy,
    ) -> StoreResult<DomainRisk> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .risks
            .entry(hostname.to_string())
            .or_insert_with(|| DomainRisk::new(hostname, policy.min_delay_ms));
        *entry = entry.with_delay(delay_ms, policy);
        Ok(entry.clone())
    }

    async fn record_domain_friction(
        &self,
        hostname: &str,
        status: u16,
        policy: &RiskPolicy,
    ) -> StoreResult<DomainRisk> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .risks
            .entry(hostname.to_string())
            .or_insert_with(|| DomainRisk::new(hostname, policy.min_delay_ms));
        *entry = entry.escalated(status, policy);
        Ok(entry.clone())
    }

    async fn record_domain_success(
        &self,
        hostname: &str,
        policy: &RiskPolicy,
    ) -> StoreResult<DomainRisk> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .risks
            .entry(hostname.to_string())
            .or_insert_with(|| DomainRisk::new(hostname, policy.min_delay_ms));
        *entry = entry.decayed(policy);
        Ok(entry.clone())
    }

    async fn list_domain_risks(&self, limit: usize) -> StoreResult<Vec<DomainRisk>> {
        let tables = self.tables.read().await;
        let mut risks: Vec<DomainRisk> = tables.risks.values().cloned().collect();
        risks.sort_by(|a, b| {
            b.friction_count
                .cmp(&a.friction_count)
                .then_with(|| a.hostname.cmp(&b.hostname))
        });
        risks.truncate(limit);
        Ok(risks)
    }

    async fn get_valid_url_fetch_cache(
        &self,
        url: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<UrlFetchCacheEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .cache
            .get(url)
            .filter(|e| e.is_valid_at(now))
            .cloned())
    }

    async fn upsert_url_fetch_cache(&self, entry: &UrlFetchCacheEntry) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.cache.insert(entry.url.clone(), entry.clone());
        Ok(())
    }

    async fn purge_expired_url_cache(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.cache.len();
        tables.cache.retain(|_, e| e.is_valid_at(now));
        Ok((before - tables.cache.len()) as u64)
    }
}
