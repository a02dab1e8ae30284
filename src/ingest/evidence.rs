//! Accumulates run counters into [`IngestionEvidence`].

use tokio::time::Instant;

use crate::models::{
    DiscoverySource, IngestSummary, IngestionEvidence, IngestionMode, IngestionOutcome,
    POLICY_VERSION,
};

#[derive(Debug)]
pub struct EvidenceBuilder {
    trace_id: String,
    mode: IngestionMode,
    started: Instant,
    discovery_sources: Vec<DiscoverySource>,
    pub pages_planned: u32,
    pub pages_fetched: u32,
    pub pages_used: u32,
    pub cache_hits: u32,
    pub cache_misses: u32,
    friction_signals: Vec<String>,
    domain_risk_score: u32,
}

impl EvidenceBuilder {
    pub fn new(trace_id: &str, mode: IngestionMode) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            mode,
            started: Instant::now(),
            discovery_sources: Vec::new(),
            pages_planned: 0,
            pages_fetched: 0,
            pages_used: 0,
            cache_hits: 0,
            cache_misses: 0,
            friction_signals: Vec::new(),
            domain_risk_score: 0,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Append a provenance tag; repeated tags are ignored.
    pub fn add_source(&mut self, source: DiscoverySource) {
        if !self.discovery_sources.contains(&source) {
            self.discovery_sources.push(source);
        }
    }

    pub fn sources(&self) -> &[DiscoverySource] {
        &self.discovery_sources
    }

    pub fn add_planned(&mut self, count: usize) {
        self.pages_planned += count as u32;
    }

    pub fn add_friction_signal(&mut self, signal: String) {
        self.friction_signals.push(signal);
    }

    pub fn set_domain_risk_score(&mut self, score: u32) {
        self.domain_risk_score = score;
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Snapshot the counters with the given outcome and the elapsed time.
    pub fn build(&self, outcome: IngestionOutcome) -> IngestionEvidence {
        IngestionEvidence {
            trace_id: self.trace_id.clone(),
            policy_version: POLICY_VERSION.to_string(),
            ingest: IngestSummary {
                mode: self.mode,
                discovery_sources: self.discovery_sources.clone(),
                pages_planned: self.pages_planned,
                pages_fetched: self.pages_fetched,
                pages_used: self.pages_used,
                cache_hits: self.cache_hits,
                cache_misses: self.cache_misses,
                outcome,
                friction_signals: self.friction_signals.clone(),
                domain_risk_score: self.domain_risk_score,
                duration_ms: self.elapsed_ms(),
            },
        }
    }
}
