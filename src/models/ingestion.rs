//! Ingestion run models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Crawl mode; determines the page budget and which discovery steps run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum IngestionMode {
    /// Small budget, robots + sitemap + homepage discovery.
    #[default]
    Light,
    /// Larger budget, same discovery as light.
    Standard,
    /// Fetch exactly the caller-supplied URLs; no robots/sitemap discovery.
    #[value(name = "user-assisted")]
    UserAssisted,
}

impl IngestionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Standard => "standard",
            Self::UserAssisted => "user_assisted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "light" => Some(Self::Light),
            "standard" => Some(Self::Standard),
            "user_assisted" | "user-assisted" => Some(Self::UserAssisted),
            _ => None,
        }
    }
}

impl std::fmt::Display for IngestionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionOutcome {
    /// Run record created but not yet finalized.
    InProgress,
    Success,
    Partial,
    Blocked,
    Error,
}

impl IngestionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Blocked => "blocked",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "success" => Some(Self::Success),
            "partial" => Some(Self::Partial),
            "blocked" => Some(Self::Blocked),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether the run produced pages a downstream stage can use.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Success | Self::Partial)
    }
}

impl std::fmt::Display for IngestionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance tag for a candidate URL or discovery signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscoverySource {
    #[serde(rename = "robots.txt")]
    RobotsTxt,
    #[serde(rename = "sitemap")]
    Sitemap,
    #[serde(rename = "json-ld")]
    JsonLd,
    #[serde(rename = "homepage")]
    Homepage,
    #[serde(rename = "user_list")]
    UserList,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RobotsTxt => "robots.txt",
            Self::Sitemap => "sitemap",
            Self::JsonLd => "json-ld",
            Self::Homepage => "homepage",
            Self::UserList => "user_list",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "robots.txt" => Some(Self::RobotsTxt),
            "sitemap" => Some(Self::Sitemap),
            "json-ld" => Some(Self::JsonLd),
            "homepage" => Some(Self::Homepage),
            "user_list" => Some(Self::UserList),
            _ => None,
        }
    }
}

/// Persisted record of one pipeline invocation.
///
/// Created (partially) when a run starts and finalized once when it ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionRun {
    /// Store-assigned identifier (0 until created).
    pub id: i64,
    pub business_slug: String,
    pub trace_id: String,
    pub root_url: String,
    pub mode: IngestionMode,
    pub discovery_sources: Vec<DiscoverySource>,
    pub pages_planned: u32,
    pub pages_fetched: u32,
    pub pages_used: u32,
    pub cache_hits: u32,
    pub cache_misses: u32,
    pub outcome: IngestionOutcome,
    /// `"<status>:<url>"` entries in the order they were observed.
    pub friction_signals: Vec<String>,
    pub domain_risk_score: u32,
    pub duration_ms: u64,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IngestionRun {
    /// Create an in-progress run record.
    pub fn new(business_slug: &str, trace_id: &str, root_url: &str, mode: IngestionMode) -> Self {
        Self {
            id: 0,
            business_slug: business_slug.to_string(),
            trace_id: trace_id.to_string(),
            root_url: root_url.to_string(),
            mode,
            discovery_sources: Vec::new(),
            pages_planned: 0,
            pages_fetched: 0,
            pages_used: 0,
            cache_hits: 0,
            cache_misses: 0,
            outcome: IngestionOutcome::InProgress,
            friction_signals: Vec::new(),
            domain_risk_score: 0,
            duration_ms: 0,
            last_error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// True once the run has been finalized.
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}
