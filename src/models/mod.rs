//! Data models for site ingestion.

mod domain_risk;
mod evidence;
mod ingestion;
mod url_cache;

pub use domain_risk::{DomainRisk, RiskPolicy, MIN_DELAY_MS};
pub use evidence::{IngestSummary, IngestionEvidence, POLICY_VERSION};
pub use ingestion::{DiscoverySource, IngestionMode, IngestionOutcome, IngestionRun};
pub use url_cache::UrlFetchCacheEntry;
