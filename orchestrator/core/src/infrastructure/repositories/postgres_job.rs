// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use super::apply_progress;
use crate::domain::job::{Job, JobId, JobStatus};
use crate::domain::repository::{JobRepository, ProgressUpdate, RepositoryError};

/// Jobs stored as one JSONB document per row, with status, progress and
/// timestamps mirrored into columns for conditional updates and listing.
pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the jobs table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sparkplan_jobs (
                id UUID PRIMARY KEY,
                status TEXT NOT NULL,
                progress SMALLINT NOT NULL DEFAULT 0,
                job JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS sparkplan_jobs_created_at ON sparkplan_jobs (created_at DESC)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn decode(row: &sqlx::postgres::PgRow) -> Result<Job, RepositoryError> {
        let value: serde_json::Value = row.get("job");
        serde_json::from_value(value)
            .map_err(|e| RepositoryError::Serialization(format!("Failed to deserialize job: {}", e)))
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        let document = serde_json::to_value(job)?;
        sqlx::query(
            r#"
            INSERT INTO sparkplan_jobs (id, status, progress, job, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                progress = EXCLUDED.progress,
                job = EXCLUDED.job,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(job.id.0)
        .bind(job.status.as_str())
        .bind(job.progress as i16)
        .bind(document)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save job: {}", e)))?;
        Ok(())
    }

    async fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, RepositoryError> {
        let document = serde_json::to_value(job)?;
        let result = sqlx::query(
            r#"
            UPDATE sparkplan_jobs
            SET status = $2, progress = $3, job = $4, updated_at = $5
            WHERE id = $1 AND status = $6
            "#,
        )
        .bind(job.id.0)
        .bind(job.status.as_str())
        .bind(job.progress as i16)
        .bind(document)
        .bind(job.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query("SELECT job FROM sparkplan_jobs WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn status(&self, id: JobId) -> Result<Option<JobStatus>, RepositoryError> {
        let row = sqlx::query("SELECT status FROM sparkplan_jobs WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let status: String = row.get("status");
                JobStatus::parse(&status)
                    .map(Some)
                    .ok_or_else(|| RepositoryError::Serialization(format!("unknown job status '{}'", status)))
            }
            None => Ok(None),
        }
    }

    async fn update_progress(&self, id: JobId, update: ProgressUpdate) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT job FROM sparkplan_jobs WHERE id = $1 AND status = $2 FOR UPDATE")
            .bind(id.0)
            .bind(JobStatus::Processing.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        let mut job = Self::decode(&row)?;
        if !apply_progress(&mut job, update) {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query(
            r#"
            UPDATE sparkplan_jobs
            SET progress = GREATEST(progress, $2), job = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(job.progress as i16)
        .bind(serde_json::to_value(&job)?)
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<Job>, RepositoryError> {
        let rows = sqlx::query("SELECT job FROM sparkplan_jobs ORDER BY created_at DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::decode).collect()
    }
}
