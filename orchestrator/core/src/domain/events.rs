// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::cache::CacheNamespace;
use crate::domain::error::ErrorKind;
use crate::domain::job::{AgentKind, JobId};

/// Job lifecycle events published on the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    JobSubmitted {
        job_id: JobId,
        circuit_count: usize,
        agents: Vec<AgentKind>,
        submitted_at: DateTime<Utc>,
    },
    JobStarted {
        job_id: JobId,
        started_at: DateTime<Utc>,
    },
    CacheHit {
        job_id: JobId,
        layer: CacheNamespace,
        agent: Option<AgentKind>,
        hit_count: u64,
    },
    RetrievalCompleted {
        job_id: JobId,
        keyword_count: usize,
        result_count: usize,
        from_cache: usize,
    },
    AgentStarted {
        job_id: JobId,
        agent: AgentKind,
        started_at: DateTime<Utc>,
    },
    AgentProgress {
        job_id: JobId,
        agent: AgentKind,
        agent_percent: u8,
        overall_percent: u8,
        message: String,
    },
    AgentSplit {
        job_id: JobId,
        agent: AgentKind,
        depth: u32,
        first_half: usize,
        second_half: usize,
    },
    AgentFallback {
        job_id: JobId,
        agent: AgentKind,
        fallback: String,
        reason: String,
    },
    AgentCompleted {
        job_id: JobId,
        agent: AgentKind,
        item_count: usize,
        duration_ms: u64,
    },
    AgentFailed {
        job_id: JobId,
        agent: AgentKind,
        kind: ErrorKind,
        error: String,
    },
    JobCompleted {
        job_id: JobId,
        cached: bool,
        generation_time_ms: u64,
        completed_at: DateTime<Utc>,
    },
    JobFailed {
        job_id: JobId,
        error: String,
        failed_at: DateTime<Utc>,
    },
    JobCancelled {
        job_id: JobId,
        cancelled_at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::JobSubmitted { job_id, .. }
            | JobEvent::JobStarted { job_id, .. }
            | JobEvent::CacheHit { job_id, .. }
            | JobEvent::RetrievalCompleted { job_id, .. }
            | JobEvent::AgentStarted { job_id, .. }
            | JobEvent::AgentProgress { job_id, .. }
            | JobEvent::AgentSplit { job_id, .. }
            | JobEvent::AgentFallback { job_id, .. }
            | JobEvent::AgentCompleted { job_id, .. }
            | JobEvent::AgentFailed { job_id, .. }
            | JobEvent::JobCompleted { job_id, .. }
            | JobEvent::JobFailed { job_id, .. }
            | JobEvent::JobCancelled { job_id, .. } => *job_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            JobEvent::JobSubmitted { .. } => "JobSubmitted",
            JobEvent::JobStarted { .. } => "JobStarted",
            JobEvent::CacheHit { .. } => "CacheHit",
            JobEvent::RetrievalCompleted { .. } => "RetrievalCompleted",
            JobEvent::AgentStarted { .. } => "AgentStarted",
            JobEvent::AgentProgress { .. } => "AgentProgress",
            JobEvent::AgentSplit { .. } => "AgentSplit",
            JobEvent::AgentFallback { .. } => "AgentFallback",
            JobEvent::AgentCompleted { .. } => "AgentCompleted",
            JobEvent::AgentFailed { .. } => "AgentFailed",
            JobEvent::JobCompleted { .. } => "JobCompleted",
            JobEvent::JobFailed { .. } => "JobFailed",
            JobEvent::JobCancelled { .. } => "JobCancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::JobCompleted { .. } | JobEvent::JobFailed { .. } | JobEvent::JobCancelled { .. }
        )
    }
}
