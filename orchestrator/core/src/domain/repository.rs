// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts, defined in the domain layer and implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Stores | Implementations |
//! |-------|--------|-----------------|
//! | `JobRepository` | `Job` aggregates | `InMemoryJobRepository`, `PostgresJobRepository` |
//! | `CacheStore` | L1/L2/L3 cache rows | `InMemoryCacheStore`, `PostgresCacheStore` |
//!
//! In-memory implementations serve development and tests; PostgreSQL is
//! selected when `spec.database` is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::cache::{CacheEntry, CacheNamespace};
use crate::domain::job::{AgentKind, AgentProgress, Job, JobId, JobStatus};

/// Storage backend for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

/// Best-effort progress write for a processing job.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Overall percentage; stored as `max(stored, percent)`
    pub percent: u8,
    pub step: Option<String>,
    pub agent: Option<(AgentKind, AgentProgress)>,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Save job (create or overwrite)
    async fn save(&self, job: &Job) -> Result<(), RepositoryError>;

    /// Save only if the stored status still equals `expected`.
    /// Returns false when another writer changed the status first.
    async fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, RepositoryError>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError>;

    /// Persisted status alone, for cheap cancellation polling
    async fn status(&self, id: JobId) -> Result<Option<JobStatus>, RepositoryError>;

    /// Apply a progress update if the job is processing. Returns whether a
    /// row was touched. Stored progress never decreases.
    async fn update_progress(&self, id: JobId, update: ProgressUpdate) -> Result<bool, RepositoryError>;

    /// Most recently created jobs first
    async fn find_recent(&self, limit: usize) -> Result<Vec<Job>, RepositoryError>;
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Raw row lookup; expiry is the caller's concern
    async fn get(&self, namespace: CacheNamespace, key: &str) -> Result<Option<CacheEntry>, RepositoryError>;

    /// Idempotent upsert; replaces payload, counters and expiry
    async fn put(&self, namespace: CacheNamespace, entry: CacheEntry) -> Result<(), RepositoryError>;

    /// Increment `hit_count`, stamp `last_used_at`, return the updated row
    async fn record_hit(
        &self,
        namespace: CacheNamespace,
        key: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, RepositoryError>;

    /// Physically delete rows expired at `now`; returns how many went
    async fn purge_expired(&self, namespace: CacheNamespace, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
