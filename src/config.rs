//! Configuration management for site-ingest using the prefer crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ingest::IngestSettings;
use crate::models::RiskPolicy;

/// Default database filename.
pub const DEFAULT_DATABASE: &str = "site-ingest.db";

/// Environment variable overriding the database path.
pub const DATABASE_ENV: &str = "SITE_INGEST_DATABASE";

/// Environment variable overriding the user agent.
pub const USER_AGENT_ENV: &str = "SITE_INGEST_USER_AGENT";

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// User agent string. Defaults to the declared crawler identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Page fetch timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robots_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sitemap_timeout_secs: Option<u64>,
    /// Starting delay between page requests in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_hours: Option<i64>,
    /// Page budgets per mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light_pages: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_pages: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assisted_pages: Option<usize>,
    /// Domain risk backoff tuning.
    #[serde(default)]
    pub risk: RiskPolicy,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers site-ingest config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("site-ingest").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("{}; using defaults", e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            Err(_) => {
                // No config file found, use defaults with env overrides
                Self::default_with_env()
            }
        }
    }

    /// Load from an explicit path if given, otherwise discover.
    pub async fn load_with(config_path: Option<&Path>) -> anyhow::Result<Self> {
        match config_path {
            Some(path) => Self::load_from_path(path).await.map_err(anyhow::Error::msg),
            None => Ok(Self::load().await),
        }
    }

    /// Create a default config with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        tracing::debug!("Loaded config from {}", path.display());
        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    /// Apply `SITE_INGEST_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(database) = lookup(DATABASE_ENV).filter(|s| !s.is_empty()) {
            self.database = Some(database);
        }
        if let Some(user_agent) = lookup(USER_AGENT_ENV).filter(|s| !s.is_empty()) {
            self.user_agent = Some(user_agent);
        }
        self
    }

    /// Database path. Relative paths resolve against the config file's directory.
    pub fn database_path(&self) -> PathBuf {
        let database = Path::new(self.database.as_deref().unwrap_or(DEFAULT_DATABASE));
        if database.is_absolute() {
            return database.to_path_buf();
        }
        match self.source_path.as_ref().and_then(|p| p.parent()) {
            Some(base) => base.join(database),
            None => database.to_path_buf(),
        }
    }

    /// Runtime settings for the pipeline.
    pub fn ingest_settings(&self) -> IngestSettings {
        let defaults = IngestSettings::default();
        IngestSettings {
            request_timeout: self
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            robots_timeout: self
                .robots_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.robots_timeout),
            sitemap_timeout: self
                .sitemap_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.sitemap_timeout),
            default_delay_ms: self.default_delay_ms.unwrap_or(defaults.default_delay_ms),
            cache_ttl: self
                .cache_ttl_hours
                .map(chrono::Duration::hours)
                .unwrap_or(defaults.cache_ttl),
            light_pages: self.light_pages.unwrap_or(defaults.light_pages),
            standard_pages: self.standard_pages.unwrap_or(defaults.standard_pages),
            assisted_pages: self.assisted_pages.unwrap_or(defaults.assisted_pages),
            risk: self.risk.clone(),
        }
    }
}
