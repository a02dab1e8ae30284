//! Structured evidence describing what a run attempted and why it stopped.

use serde::{Deserialize, Serialize};

use super::{DiscoverySource, IngestionMode, IngestionOutcome, IngestionRun};

/// Version of the crawl policy (budgets, friction rules) that produced the evidence.
pub const POLICY_VERSION: &str = "ingest-policy/2";

/// Evidence returned to callers and mirrored into the run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionEvidence {
    pub trace_id: String,
    pub policy_version: String,
    pub ingest: IngestSummary,
}

/// Counts and signals for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub mode: IngestionMode,
    pub discovery_sources: Vec<DiscoverySource>,
    pub pages_planned: u32,
    pub pages_fetched: u32,
    pub pages_used: u32,
    pub cache_hits: u32,
    pub cache_misses: u32,
    pub outcome: IngestionOutcome,
    pub friction_signals: Vec<String>,
    pub domain_risk_score: u32,
    pub duration_ms: u64,
}

impl IngestionEvidence {
    /// Copy the evidence counters onto a run record.
    pub fn apply_to(&self, run: &mut IngestionRun) {
        let ingest = &self.ingest;
        run.mode = ingest.mode;
        run.discovery_sources = ingest.discovery_sources.clone();
        run.pages_planned = ingest.pages_planned;
        run.pages_fetched = ingest.pages_fetched;
        run.pages_used = ingest.pages_used;
        run.cache_hits = ingest.cache_hits;
        run.cache_misses = ingest.cache_misses;
        run.outcome = ingest.outcome;
        run.friction_signals = ingest.friction_signals.clone();
        run.domain_risk_score = ingest.domain_risk_score;
        run.duration_ms = ingest.duration_ms;
    }
}
