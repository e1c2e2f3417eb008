// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::cache::{CacheEntry, CacheNamespace};
use crate::domain::repository::{CacheStore, RepositoryError};

/// One table per cache layer: `sparkplan_cache_l1`, `_l2` and `_l3`.
pub struct PostgresCacheStore {
    pool: PgPool,
}

impl PostgresCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        for namespace in CacheNamespace::ALL {
            let table = namespace.table();
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    cache_key TEXT PRIMARY KEY,
                    payload JSONB NOT NULL,
                    hit_count BIGINT NOT NULL DEFAULT 0,
                    created_at TIMESTAMPTZ NOT NULL,
                    last_used_at TIMESTAMPTZ NOT NULL,
                    expires_at TIMESTAMPTZ NOT NULL
                )
                "#
            ))
            .execute(&self.pool)
            .await?;
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS {table}_expires_at ON {table} (expires_at)"
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    fn decode(row: &PgRow) -> CacheEntry {
        let hit_count: i64 = row.get("hit_count");
        CacheEntry {
            key: row.get("cache_key"),
            payload: row.get("payload"),
            hit_count: hit_count.max(0) as u64,
            created_at: row.get("created_at"),
            last_used_at: row.get("last_used_at"),
            expires_at: row.get("expires_at"),
        }
    }
}

#[async_trait]
impl CacheStore for PostgresCacheStore {
    async fn get(&self, namespace: CacheNamespace, key: &str) -> Result<Option<CacheEntry>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT cache_key, payload, hit_count, created_at, last_used_at, expires_at FROM {} WHERE cache_key = $1",
            namespace.table()
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::decode))
    }

    async fn put(&self, namespace: CacheNamespace, entry: CacheEntry) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (cache_key, payload, hit_count, created_at, last_used_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (cache_key) DO UPDATE SET
                payload = EXCLUDED.payload,
                hit_count = EXCLUDED.hit_count,
                created_at = EXCLUDED.created_at,
                last_used_at = EXCLUDED.last_used_at,
                expires_at = EXCLUDED.expires_at
            "#,
            namespace.table()
        ))
        .bind(&entry.key)
        .bind(&entry.payload)
        .bind(entry.hit_count as i64)
        .bind(entry.created_at)
        .bind(entry.last_used_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to write {} cache entry: {}", namespace, e)))?;
        Ok(())
    }

    async fn record_hit(
        &self,
        namespace: CacheNamespace,
        key: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET hit_count = hit_count + 1, last_used_at = $2
            WHERE cache_key = $1
            RETURNING cache_key, payload, hit_count, created_at, last_used_at, expires_at
            "#,
            namespace.table()
        ))
        .bind(key)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::decode))
    }

    async fn purge_expired(&self, namespace: CacheNamespace, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE expires_at <= $1", namespace.table()))
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
