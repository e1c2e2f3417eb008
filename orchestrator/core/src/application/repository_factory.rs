// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on the storage backend
//! configuration. The domain layer only defines the traits; this module picks
//! the implementation.

use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::domain::config::OrchestratorConfigSpec;
use crate::domain::repository::{CacheStore, JobRepository, PostgresConfig, StorageBackend};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{
    InMemoryCacheStore, InMemoryJobRepository, PostgresCacheStore, PostgresJobRepository,
};

/// PostgreSQL when `spec.database` is configured, in-memory otherwise.
pub fn storage_backend(spec: &OrchestratorConfigSpec) -> StorageBackend {
    match &spec.database {
        Some(db) => StorageBackend::PostgreSQL(PostgresConfig {
            connection_string: db.url.clone(),
            max_connections: db.max_connections,
        }),
        None => StorageBackend::InMemory,
    }
}

/// Creates a JobRepository implementation based on the configured backend
pub fn create_job_repository(backend: &StorageBackend, pool: Option<PgPool>) -> Arc<dyn JobRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresJobRepository::new(pool)),
        _ => Arc::new(InMemoryJobRepository::new()),
    }
}

/// Creates a CacheStore implementation based on the configured backend
pub fn create_cache_store(backend: &StorageBackend, pool: Option<PgPool>) -> Arc<dyn CacheStore> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresCacheStore::new(pool)),
        _ => Arc::new(InMemoryCacheStore::new()),
    }
}

/// Job and cache persistence for one orchestrator instance.
#[derive(Clone)]
pub struct Repositories {
    pub jobs: Arc<dyn JobRepository>,
    pub cache: Arc<dyn CacheStore>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            jobs: Arc::new(InMemoryJobRepository::new()),
            cache: Arc::new(InMemoryCacheStore::new()),
        }
    }

    /// Connects (and prepares tables) when the backend is PostgreSQL.
    pub async fn connect(backend: &StorageBackend) -> Result<Self> {
        let StorageBackend::PostgreSQL(config) = backend else {
            info!("Using in-memory job and cache storage");
            return Ok(Self::in_memory());
        };

        let db = Database::from_config(config).await?;
        let pool = db.get_pool().clone();
        PostgresJobRepository::new(pool.clone()).ensure_schema().await?;
        PostgresCacheStore::new(pool.clone()).ensure_schema().await?;
        info!("Using PostgreSQL job and cache storage");
        Ok(Self {
            jobs: create_job_repository(backend, Some(pool.clone())),
            cache: create_cache_store(backend, Some(pool)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::OrchestratorConfigManifest;

    #[test]
    fn test_default_config_selects_in_memory() {
        let manifest = OrchestratorConfigManifest::default();
        assert!(matches!(storage_backend(&manifest.spec), StorageBackend::InMemory));
    }
}
