//! Per-hostname risk record and the policy that evolves it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Politeness floor between requests to one host.
pub const MIN_DELAY_MS: u64 = 2000;

/// Cumulative friction history for a hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRisk {
    pub hostname: String,
    pub friction_count: u32,
    pub recommended_delay_ms: u64,
    /// HTTP status of the most recent friction event (0 for network failure).
    pub last_friction_status: Option<u16>,
    pub updated_at: DateTime<Utc>,
}

impl DomainRisk {
    /// Record for a hostname that has never produced friction.
    pub fn new(hostname: &str, delay_ms: u64) -> Self {
        Self {
            hostname: hostname.to_string(),
            friction_count: 0,
            recommended_delay_ms: delay_ms,
            last_friction_status: None,
            updated_at: Utc::now(),
        }
    }

    /// Apply one friction event.
    pub fn escalated(&self, status: u16, policy: &RiskPolicy) -> Self {
        let base = self.recommended_delay_ms.max(policy.min_delay_ms) as f64;
        let delay = (base * policy.backoff_multiplier) as u64;
        Self {
            hostname: self.hostname.clone(),
            friction_count: self.friction_count.saturating_add(1),
            recommended_delay_ms: delay.min(policy.max_delay_ms).max(policy.min_delay_ms),
            last_friction_status: Some(status),
            updated_at: Utc::now(),
        }
    }

    /// Apply one clean fetch: halve the friction count and relax the delay.
    pub fn decayed(&self, policy: &RiskPolicy) -> Self {
        let delay = (self.recommended_delay_ms as f64 * policy.recovery_multiplier) as u64;
        Self {
            hostname: self.hostname.clone(),
            friction_count: self.friction_count / 2,
            recommended_delay_ms: delay.max(policy.min_delay_ms),
            last_friction_status: self.last_friction_status,
            updated_at: Utc::now(),
        }
    }

    /// Replace the delay, kept between the policy floor and ceiling.
    pub fn with_delay(&self, delay_ms: u64, policy: &RiskPolicy) -> Self {
        Self {
            recommended_delay_ms: delay_ms.min(policy.max_delay_ms).max(policy.min_delay_ms),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Tuning for how friction raises and clean fetches relax the delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    /// Delay for hostnames with no history, and the floor for every delay.
    pub min_delay_ms: u64,
    /// Ceiling for escalated delays.
    pub max_delay_ms: u64,
    /// Multiplier applied on each friction event.
    pub backoff_multiplier: f64,
    /// Multiplier applied on each clean fetch (< 1.0).
    pub recovery_multiplier: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            min_delay_ms: MIN_DELAY_MS,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friction_doubles_delay_up_to_ceiling() {
        let policy = RiskPolicy::default();
        let mut risk = DomainRisk::new("example.com", MIN_DELAY_MS);

        risk = risk.escalated(429, &policy);
        assert_eq!(risk.friction_count, 1);
        assert_eq!(risk.recommended_delay_ms, 4000);
        assert_eq!(risk.last_friction_status, Some(429));

        for _ in 0..10 {
            risk = risk.escalated(503, &policy);
        }
        assert_eq!(risk.friction_count, 11);
        assert_eq!(risk.recommended_delay_ms, policy.max_delay_ms);
    }

    #[test]
    fn success_decays_count_and_delay() {
        let policy = RiskPolicy::default();
        let risk = DomainRisk {
            friction_count: 5,
            recommended_delay_ms: 10_000,
            ..DomainRisk::new("example.com", MIN_DELAY_MS)
        };

        let risk = risk.decayed(&policy);
        assert_eq!(risk.friction_count, 2);
        assert_eq!(risk.recommended_delay_ms, 8000);

        let risk = risk.decayed(&policy).decayed(&policy);
        assert_eq!(risk.friction_count, 0);
    }

    #[test]
    fn decay_never_drops_below_floor() {
        let policy = RiskPolicy::default();
        let risk = DomainRisk::new("example.com", MIN_DELAY_MS).decayed(&policy);
        assert_eq!(risk.recommended_delay_ms, MIN_DELAY_MS);
    }

    #[test]
    fn explicit_delay_is_floored() {
        let policy = RiskPolicy::default();
        let risk = DomainRisk::new("example.com", MIN_DELAY_MS);
        assert_eq!(risk.with_delay(500, &policy).recommended_delay_ms, 2000);
        assert_eq!(risk.with_delay(7000, &policy).recommended_delay_ms, 7000);
    }

    #[test]
    fn explicit_delay_is_capped_at_ceiling() {
        let policy = RiskPolicy::default();
        let risk = DomainRisk::new("example.com", MIN_DELAY_MS);
        assert_eq!(
            risk.with_delay(86_400_000, &policy).recommended_delay_ms,
            policy.max_delay_ms
        );
    }
}
