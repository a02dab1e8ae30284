//! `cache` commands.

use console::style;

use crate::cache::UrlFetchCache;
use crate::config::Config;

use super::open_store;

pub async fn cmd_cache_purge(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let cache = UrlFetchCache::new(store, config.ingest_settings().cache_ttl);
    let removed = cache.purge_expired().await?;
    println!(
        "{} Removed {} expired cache entries",
        style("✓").green(),
        removed
    );
    Ok(())
}
