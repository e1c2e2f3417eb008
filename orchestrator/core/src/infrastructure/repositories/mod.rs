// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Repository Implementations
//!
//! In-memory implementations of the domain persistence traits, plus the
//! PostgreSQL implementations in the submodules.

pub mod postgres_cache;
pub mod postgres_job;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::cache::{CacheEntry, CacheNamespace};
use crate::domain::job::{Job, JobId, JobStatus};
use crate::domain::repository::{CacheStore, JobRepository, ProgressUpdate, RepositoryError};

pub use postgres_cache::PostgresCacheStore;
pub use postgres_job::PostgresJobRepository;

/// Applies a progress update to a job held in memory or loaded from a row.
/// Returns false when the job is not processing.
pub(crate) fn apply_progress(job: &mut Job, update: ProgressUpdate) -> bool {
    if job.status != JobStatus::Processing {
        return false;
    }
    job.record_progress(update.percent, update.step, update.at);
    if let Some((kind, progress)) = update.agent {
        job.set_agent(kind, progress);
    }
    // Every accepted update counts as a heartbeat
    job.updated_at = update.at;
    true
}

#[derive(Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        self.jobs.write().insert(job.id, job.clone());
        Ok(())
    }

    async fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, RepositoryError> {
        let mut jobs = self.jobs.write();
        match jobs.get(&job.id) {
            Some(stored) if stored.status == expected => {
                jobs.insert(job.id, job.clone());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound(format!("job {}", job.id))),
        }
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    async fn status(&self, id: JobId) -> Result<Option<JobStatus>, RepositoryError> {
        Ok(self.jobs.read().get(&id).map(|j| j.status))
    }

    async fn update_progress(&self, id: JobId, update: ProgressUpdate) -> Result<bool, RepositoryError> {
        let mut jobs = self.jobs.write();
        Ok(jobs.get_mut(&id).map(|job| apply_progress(job, update)).unwrap_or(false))
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<Job>, RepositoryError> {
        let mut jobs: Vec<Job> = self.jobs.read().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }
}

/// Cache rows keyed by namespace then key.
#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    rows: Arc<RwLock<HashMap<(CacheNamespace, String), CacheEntry>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, namespace: CacheNamespace) -> usize {
        self.rows.read().keys().filter(|(ns, _)| *ns == namespace).count()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, namespace: CacheNamespace, key: &str) -> Result<Option<CacheEntry>, RepositoryError> {
        Ok(self.rows.read().get(&(namespace, key.to_string())).cloned())
    }

    async fn put(&self, namespace: CacheNamespace, entry: CacheEntry) -> Result<(), RepositoryError> {
        self.rows.write().insert((namespace, entry.key.clone()), entry);
        Ok(())
    }

    async fn record_hit(
        &self,
        namespace: CacheNamespace,
        key: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, RepositoryError> {
        let mut rows = self.rows.write();
        Ok(rows.get_mut(&(namespace, key.to_string())).map(|entry| {
            entry.hit_count += 1;
            entry.last_used_at = at;
            entry.clone()
        }))
    }

    async fn purge_expired(&self, namespace: CacheNamespace, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|(ns, _), entry| *ns != namespace || !entry.is_expired(now));
        Ok((before - rows.len()) as u64)
    }
}
