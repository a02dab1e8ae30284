//! Domain risk ledger.
//!
//! Per-hostname friction history shared across runs. Backs off on friction,
//! gradually recovers on clean fetches. All updates go through the store's
//! atomic operations so concurrent runs cannot lose increments.

use tracing::{debug, info, warn};
use url::Url;

use crate::models::{DomainRisk, RiskPolicy};
use crate::repository::{SharedStore, StoreResult};

/// Typed facade over the store's domain-risk records.
#[derive(Clone)]
pub struct DomainRiskLedger {
    store: SharedStore,
    policy: RiskPolicy,
}

impl DomainRiskLedger {
    pub fn new(store: SharedStore, policy: RiskPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    /// Extract hostname from URL.
    pub fn extract_hostname(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_ascii_lowercase()))
    }

    /// Current record, or a fresh one at the policy floor if the host is unknown.
    pub async fn get(&self, hostname: &str) -> StoreResult<DomainRisk> {
        Ok(self
            .store
            .get_domain_risk(hostname)
            .await?
            .unwrap_or_else(|| DomainRisk::new(hostname, self.policy.min_delay_ms)))
    }

    /// Record a friction event (status 0 for network failure).
    pub async fn record_friction(&self, hostname: &str, status: u16) -> StoreResult<DomainRisk> {
        let risk = self
            .store
            .record_domain_friction(hostname, status, &self.policy)
            .await?;
        warn!(
            "Friction from {} (status {}): count {}, delay now {}ms",
            hostname, status, risk.friction_count, risk.recommended_delay_ms
        );
        Ok(risk)
    }

    /// Record a clean fetch.
    pub async fn record_success(&self, hostname: &str) -> StoreResult<DomainRisk> {
        let risk = self
            .store
            .record_domain_success(hostname, &self.policy)
            .await?;
        debug!(
            "Clean fetch from {}: count {}, delay {}ms",
            hostname, risk.friction_count, risk.recommended_delay_ms
        );
        Ok(risk)
    }

    /// Set the recommended delay, kept within the policy bounds.
    pub async fn set_recommended_delay(
        &self,
        hostname: &str,
        delay_ms: u64,
    ) -> StoreResult<DomainRisk> {
        let risk = self
            .store
            .update_domain_risk(hostname, delay_ms, &self.policy)
            .await?;
        info!(
            "Recommended delay for {} set to {}ms",
            hostname, risk.recommended_delay_ms
        );
        Ok(risk)
    }

    /// Riskiest hostnames first.
    pub async fn list(&self, limit: usize) -> StoreResult<Vec<DomainRisk>> {
        self.store.list_domain_risks(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MIN_DELAY_MS;
    use crate::repository::InMemoryIngestionStore;
    use std::sync::Arc;

    fn ledger() -> DomainRiskLedger {
        DomainRiskLedger::new(Arc::new(InMemoryIngestionStore::new()), RiskPolicy::default())
    }

    #[test]
    fn test_extract_hostname() {
        assert_eq!(
            DomainRiskLedger::extract_hostname("https://WWW.Example.com/a?b=c"),
            Some("www.example.com".to_string())
        );
        assert_eq!(DomainRiskLedger::extract_hostname("not a url"), None);
    }

    #[tokio::test]
    async fn unknown_host_starts_at_floor() {
        let ledger = ledger();
        let risk = ledger.get("fresh.test").await.unwrap();
        assert_eq!(risk.friction_count, 0);
        assert_eq!(risk.recommended_delay_ms, MIN_DELAY_MS);
        assert!(ledger.list(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn friction_then_recovery() {
        let ledger = ledger();
        ledger.record_friction("x.test", 429).await.unwrap();
        let risk = ledger.record_friction("x.test", 503).await.unwrap();
        assert_eq!(risk.friction_count, 2);
        assert_eq!(risk.recommended_delay_ms, 8000);

        let risk = ledger.record_success("x.test").await.unwrap();
        assert_eq!(risk.friction_count, 1);
        assert_eq!(risk.recommended_delay_ms, 6400);
        assert_eq!(ledger.get("x.test").await.unwrap(), risk);
    }

    #[tokio::test]
    async fn crawl_delay_is_floored() {
        let ledger = ledger();
        let risk = ledger.set_recommended_delay("x.test", 500).await.unwrap();
        assert_eq!(risk.recommended_delay_ms, MIN_DELAY_MS);
        let risk = ledger.set_recommended_delay("x.test", 5000).await.unwrap();
        assert_eq!(risk.recommended_delay_ms, 5000);
    }
}
