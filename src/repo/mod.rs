/// Repository layer for the persisted TLE cache
use crate::domain::CacheEntry;
use crate::errors::ApiResult;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::future::Future;

/// Keyed store for raw TLE text, shared with other writers (last write wins)
pub trait TleCache: Send + Sync {
    fn load(&self, key: &str) -> impl Future<Output = ApiResult<Option<CacheEntry>>> + Send;
    fn save(&self, key: &str, entry: &CacheEntry) -> impl Future<Output = ApiResult<()>> + Send;
    fn clear(&self, key: &str) -> impl Future<Output = ApiResult<()>> + Send;
}

/// Postgres-backed TLE cache repository
#[derive(Clone)]
pub struct TleCacheRepo {
    pool: PgPool,
}

impl TleCacheRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl TleCache for TleCacheRepo {
    /// Get the cache entry for a satellite key
    async fn load(&self, key: &str) -> ApiResult<Option<CacheEntry>> {
        let row = sqlx::query_as::<_, (DateTime<Utc>, String)>(
            "SELECT fetched_at, raw_text FROM tle_cache WHERE cache_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(fetched_at, raw_text)| CacheEntry {
            fetched_at,
            raw_text,
        }))
    }

    /// Upsert the cache entry, no locking
    async fn save(&self, key: &str, entry: &CacheEntry) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO tle_cache(cache_key, fetched_at, raw_text)
             VALUES ($1, $2, $3)
             ON CONFLICT (cache_key) DO UPDATE
             SET fetched_at = EXCLUDED.fetched_at, raw_text = EXCLUDED.raw_text",
        )
        .bind(key)
        .bind(entry.fetched_at)
        .bind(entry.raw_text.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self, key: &str) -> ApiResult<()> {
        sqlx::query("DELETE FROM tle_cache WHERE cache_key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Initialize database tables
pub async fn init_db(pool: &PgPool) -> ApiResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tle_cache(
            cache_key TEXT PRIMARY KEY,
            fetched_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            raw_text TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
pub use memory::MemoryTleCache;
