//! SQLite-backed record store.
//!
//! Each operation opens a connection on the blocking pool. Risk updates run
//! inside an IMMEDIATE transaction so concurrent runs against the same
//! hostname serialize on the database write lock instead of losing updates.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{IngestionStore, StoreError, StoreResult};
use crate::models::{
    DiscoverySource, DomainRisk, IngestionMode, IngestionOutcome, IngestionRun, RiskPolicy,
    UrlFetchCacheEntry,
};

const SCHEMA: &str = r#"
    -- One row per pipeline invocation
    CREATE TABLE IF NOT EXISTS ingestion_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        business_slug TEXT NOT NULL,
        trace_id TEXT NOT NULL,
        root_url TEXT NOT NULL,
        mode TEXT NOT NULL,
        discovery_sources TEXT NOT NULL DEFAULT '[]',
        pages_planned INTEGER NOT NULL DEFAULT 0,
        pages_fetched INTEGER NOT NULL DEFAULT 0,
        pages_used INTEGER NOT NULL DEFAULT 0,
        cache_hits INTEGER NOT NULL DEFAULT 0,
        cache_misses INTEGER NOT NULL DEFAULT 0,
        outcome TEXT NOT NULL DEFAULT 'in_progress',
        friction_signals TEXT NOT NULL DEFAULT '[]',
        domain_risk_score INTEGER NOT NULL DEFAULT 0,
        duration_ms INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        started_at TEXT NOT NULL,
        completed_at TEXT
    );

    -- Cross-run friction history per hostname
    CREATE TABLE IF NOT EXISTS domain_risk (
        hostname TEXT PRIMARY KEY,
        friction_count INTEGER NOT NULL DEFAULT 0,
        recommended_delay_ms INTEGER NOT NULL,
        last_friction_status INTEGER,
        updated_at TEXT NOT NULL
    );

    -- Fingerprints of fetched URLs; expires_at is unix milliseconds
    CREATE TABLE IF NOT EXISTS url_fetch_cache (
        url TEXT PRIMARY KEY,
        hostname TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        content_length INTEGER NOT NULL,
        last_status INTEGER NOT NULL,
        fetched_at TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_ingestion_runs_slug
        ON ingestion_runs(business_slug, id);
    CREATE INDEX IF NOT EXISTS idx_url_fetch_cache_expiry
        ON url_fetch_cache(expires_at);
"#;

/// Persistent ingestion store in a single SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteIngestionStore {
    db_path: PathBuf,
}

impl SqliteIngestionStore {
    /// Open (creating if needed) the database at `db_path`.
    pub async fn open(db_path: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store
            .with_conn(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(store)
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = connect(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }

    /// Read-modify-write a risk row under the database write lock.
    async fn mutate_risk<F>(
        &self,
        hostname: &str,
        policy: &RiskPolicy,
        f: F,
    ) -> StoreResult<DomainRisk>
    where
        F: FnOnce(&DomainRisk, &RiskPolicy) -> DomainRisk + Send + 'static,
    {
        let hostname = hostname.to_string();
        let policy = policy.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current = load_risk(&tx, &hostname)?
                .unwrap_or_else(|| DomainRisk::new(&hostname, policy.min_delay_ms));
            let updated = f(&current, &policy);
            save_risk(&tx, &updated)?;
            tx.commit()?;
            Ok(updated)
        })
        .await
    }
}

fn connect(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    Ok(conn)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<IngestionRun> {
    let sources: String = row.get("discovery_sources")?;
    let signals: String = row.get("friction_signals")?;
    let sources: Vec<String> = serde_json::from_str(&sources).unwrap_or_default();

    Ok(IngestionRun {
        id: row.get("id")?,
        business_slug: row.get("business_slug")?,
        trace_id: row.get("trace_id")?,
        root_url: row.get("root_url")?,
        mode: IngestionMode::from_str(&row.get::<_, String>("mode")?)
            .unwrap_or(IngestionMode::Light),
        discovery_sources: sources
            .iter()
            .filter_map(|s| DiscoverySource::from_str(s))
            .collect(),
        pages_planned: row.get::<_, i64>("pages_planned")? as u32,
        pages_fetched: row.get::<_, i64>("pages_fetched")? as u32,
        pages_used: row.get::<_, i64>("pages_used")? as u32,
        cache_hits: row.get::<_, i64>("cache_hits")? as u32,
        cache_misses: row.get::<_, i64>("cache_misses")? as u32,
        outcome: IngestionOutcome::from_str(&row.get::<_, String>("outcome")?)
            .unwrap_or(IngestionOutcome::InProgress),
        friction_signals: serde_json::from_str(&signals).unwrap_or_default(),
        domain_risk_score: row.get::<_, i64>("domain_risk_score")? as u32,
        duration_ms: row.get::<_, i64>("duration_ms")?.max(0) as u64,
        last_error: row.get("last_error")?,
        started_at: parse_datetime(&row.get::<_, String>("started_at")?),
        completed_at: row
            .get::<_, Option<String>>("completed_at")?
            .map(|s| parse_datetime(&s)),
    })
}

fn row_to_risk(row: &rusqlite::Row) -> rusqlite::Result<DomainRisk> {
    Ok(DomainRisk {
        hostname: row.get("hostname")?,
        friction_count: row.get::<_, i64>("friction_count")? as u32,
        recommended_delay_ms: row.get::<_, i64>("recommended_delay_ms")?.max(0) as u64,
        last_friction_status: row
            .get::<_, Option<i64>>("last_friction_status")?
            .map(|s| s as u16),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
    })
}

fn row_to_cache_entry(row: &rusqlite::Row) -> rusqlite::Result<UrlFetchCacheEntry> {
    Ok(UrlFetchCacheEntry {
        url: row.get("url")?,
        hostname: row.get("hostname")?,
        content_hash: row.get("content_hash")?,
        content_length: row.get::<_, i64>("content_length")?.max(0) as u64,
        last_status: row.get::<_, i64>("last_status")? as u16,
        fetched_at: parse_datetime(&row.get::<_, String>("fetched_at")?),
        expires_at: from_millis(row.get("expires_at")?),
    })
}

fn load_risk(conn: &Connection, hostname: &str) -> rusqlite::Result<Option<DomainRisk>> {
    conn.query_row(
        "SELECT * FROM domain_risk WHERE hostname = ?",
        params![hostname],
        row_to_risk,
    )
    .optional()
}

fn save_risk(conn: &Connection, risk: &DomainRisk) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO domain_risk (
            hostname, friction_count, recommended_delay_ms, last_friction_status, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(hostname) DO UPDATE SET
            friction_count = excluded.friction_count,
            recommended_delay_ms = excluded.recommended_delay_ms,
            last_friction_status = excluded.last_friction_status,
            updated_at = excluded.updated_at
        "#,
        params![
            risk.hostname,
            risk.friction_count as i64,
            risk.recommended_delay_ms as i64,
            risk.last_friction_status.map(i64::from),
            risk.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn source_tags(sources: &[DiscoverySource]) -> Vec<&'static str> {
    sources.iter().map(|s| s.as_str()).collect()
}

#[async_trait]
impl IngestionStore for SqliteIngestionStore {
    async fn create_ingestion_run(&self, run: &IngestionRun) -> StoreResult<i64> {
        let run = run.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO ingestion_runs (
                    business_slug, trace_id, root_url, mode, discovery_sources,
                    outcome, friction_signals, started_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    run.business_slug,
                    run.trace_id,
                    run.root_url,
                    run.mode.as_str(),
                    serde_json::to_string(&source_tags(&run.discovery_sources))?,
                    run.outcome.as_str(),
                    serde_json::to_string(&run.friction_signals)?,
                    run.started_at.to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn complete_ingestion_run(&self, run: &IngestionRun) -> StoreResult<()> {
        let run = run.clone();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                r#"
                UPDATE ingestion_runs SET
                    mode = ?1,
                    discovery_sources = ?2,
                    pages_planned = ?3,
                    pages_fetched = ?4,
                    pages_used = ?5,
                    cache_hits = ?6,
                    cache_misses = ?7,
                    outcome = ?8,
                    friction_signals = ?9,
                    domain_risk_score = ?10,
                    duration_ms = ?11,
                    last_error = ?12,
                    completed_at = ?13
                WHERE id = ?14
                "#,
                params![
                    run.mode.as_str(),
                    serde_json::to_string(&source_tags(&run.discovery_sources))?,
                    run.pages_planned as i64,
                    run.pages_fetched as i64,
                    run.pages_used as i64,
                    run.cache_hits as i64,
                    run.cache_misses as i64,
                    run.outcome.as_str(),
                    serde_json::to_string(&run.friction_signals)?,
                    run.domain_risk_score as i64,
                    i64::try_from(run.duration_ms).unwrap_or(i64::MAX),
                    run.last_error,
                    run.completed_at.map(|dt| dt.to_rfc3339()),
                    run.id,
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::RunNotFound(run.id));
            }
            Ok(())
        })
        .await
    }

    async fn get_ingestion_run(&self, id: i64) -> StoreResult<Option<IngestionRun>> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM ingestion_runs WHERE id = ?",
                    params![id],
                    row_to_run,
                )
                .optional()?)
        })
        .await
    }

    async fn list_ingestion_runs(
        &self,
        business_slug: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<IngestionRun>> {
        let business_slug = business_slug.map(|s| s.to_string());
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT * FROM ingestion_runs
                WHERE (?1 IS NULL OR business_slug = ?1)
                ORDER BY id DESC
                LIMIT ?2
                "#,
            )?;
            let runs = stmt
                .query_map(params![business_slug, limit as i64], row_to_run)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(runs)
        })
        .await
    }

    async fn get_domain_risk(&self, hostname: &str) -> StoreResult<Option<DomainRisk>> {
        let hostname = hostname.to_string();
        self.with_conn(move |conn| Ok(load_risk(conn, &hostname)?))
            .await
    }

    async fn update_domain_risk(
        &self,
        hostname: &str,
        delay_ms: u64,
        policy: &RiskPolicy,
    ) -> StoreResult<DomainRisk> {
        self.mutate_risk(hostname, policy, move |risk, policy| {
            risk.with_delay(delay_ms, policy)
        })
        .await
    }

    async fn record_domain_friction(
        &self,
        hostname: &str,
        status: u16,
        policy: &RiskPolicy,
    ) -> StoreResult<DomainRisk> {
        self.mutate_risk(hostname, policy, move |risk, policy| {
            risk.escalated(status, policy)
        })
        .await
    }

    async fn record_domain_success(
        &self,
        hostname: &str,
        policy: &RiskPolicy,
    ) -> StoreResult<DomainRisk> {
        self.mutate_risk(hostname, policy, |risk, policy| risk.decayed(policy))
            .await
    }

    async fn list_domain_risks(&self, limit: usize) -> StoreResult<Vec<DomainRisk>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM domain_risk ORDER BY friction_count DESC, hostname ASC LIMIT ?",
            )?;
            let risks = stmt
                .query_map(params![limit as i64], row_to_risk)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(risks)
        })
        .await
    }

    async fn get_valid_url_fetch_cache(
        &self,
        url: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<UrlFetchCacheEntry>> {
        let url = url.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM url_fetch_cache WHERE url = ? AND expires_at > ?",
                    params![url, now.timestamp_millis()],
                    row_to_cache_entry,
                )
                .optional()?)
        })
        .await
    }

    async fn upsert_url_fetch_cache(&self, entry: &UrlFetchCacheEntry) -> StoreResult<()> {
        let entry = entry.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT OR REPLACE INTO url_fetch_cache (
                    url, hostname, content_hash, content_length, last_status,
                    fetched_at, expires_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    entry.url,
                    entry.hostname,
                    entry.content_hash,
                    i64::try_from(entry.content_length).unwrap_or(i64::MAX),
                    i64::from(entry.last_status),
                    entry.fetched_at.to_rfc3339(),
                    entry.expires_at.timestamp_millis(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn purge_expired_url_cache(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM url_fetch_cache WHERE expires_at <= ?",
                params![now.timestamp_millis()],
            )?;
            Ok(removed as u64)
        })
        .await
    }
}
