// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Weighted progress aggregation and the per-agent progress sink.
//!
//! Each agent owns a slice of 0..=100 proportional to its weight. The overall
//! percentage is the weighted sum of per-agent percentages, and both only ever
//! rise, so concurrent reports can interleave freely.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::agent::ProgressReporter;
use crate::domain::clock::Clock;
use crate::domain::events::JobEvent;
use crate::domain::job::{AgentKind, AgentProgress, AgentStatus, JobId, JobStatus};
use crate::domain::repository::{JobRepository, ProgressUpdate};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Default)]
struct TrackerState {
    per_agent: BTreeMap<AgentKind, u8>,
    overall: u8,
}

#[derive(Debug)]
pub struct ProgressTracker {
    weights: BTreeMap<AgentKind, u32>,
    total_weight: u32,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    /// Agents missing from `weights` weigh 1; zero weights are allowed as long
    /// as some agent weighs more.
    pub fn new(agents: &[AgentKind], weights: &BTreeMap<AgentKind, u32>) -> Self {
        let mut resolved: BTreeMap<AgentKind, u32> = agents
            .iter()
            .map(|kind| (*kind, weights.get(kind).copied().unwrap_or(1)))
            .collect();
        if resolved.values().all(|w| *w == 0) {
            resolved.values_mut().for_each(|w| *w = 1);
        }
        let total_weight = resolved.values().sum();
        Self {
            weights: resolved,
            total_weight,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Inclusive start and end of the agent's slice of overall progress.
    pub fn range(&self, kind: AgentKind) -> Option<(u8, u8)> {
        if self.total_weight == 0 {
            return None;
        }
        let mut start = 0u32;
        for (k, w) in &self.weights {
            if *k == kind {
                let lo = start * 100 / self.total_weight;
                let hi = (start + w) * 100 / self.total_weight;
                return Some((lo as u8, hi as u8));
            }
            start += w;
        }
        None
    }

    /// Record `percent` for one agent. Returns the overall percentage, which
    /// never decreases across calls.
    pub fn update(&self, kind: AgentKind, percent: u8) -> u8 {
        let percent = percent.min(100);
        let mut state = self.state.lock();
        if !self.weights.contains_key(&kind) {
            return state.overall;
        }
        let current = state.per_agent.entry(kind).or_insert(0);
        *current = (*current).max(percent);

        let weighted: u32 = state
            .per_agent
            .iter()
            .map(|(k, p)| self.weights.get(k).copied().unwrap_or(0) * u32::from(*p))
            .sum();
        let overall = (weighted / self.total_weight.max(1)) as u8;
        state.overall = state.overall.max(overall);
        state.overall
    }

    pub fn agent_percent(&self, kind: AgentKind) -> u8 {
        self.state.lock().per_agent.get(&kind).copied().unwrap_or(0)
    }

    pub fn overall(&self) -> u8 {
        self.state.lock().overall
    }
}

/// Shared per-job cancellation latch.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress sink for one agent of one job.
///
/// Every write is preceded by a read of the persisted status; observing a
/// cancelled (or otherwise non-processing) job latches the shared flag and
/// drops the write.
pub struct JobProgressSink {
    job_id: JobId,
    kind: AgentKind,
    tracker: Arc<ProgressTracker>,
    jobs: Arc<dyn JobRepository>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    cancelled: CancellationFlag,
}

impl JobProgressSink {
    pub fn new(
        job_id: JobId,
        kind: AgentKind,
        tracker: Arc<ProgressTracker>,
        jobs: Arc<dyn JobRepository>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        cancelled: CancellationFlag,
    ) -> Self {
        Self {
            job_id,
            kind,
            tracker,
            jobs,
            events,
            clock,
            cancelled,
        }
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    /// Re-read the persisted status; returns false when the job is no longer
    /// processing.
    pub async fn still_processing(&self) -> bool {
        if self.cancelled.is_cancelled() {
            return false;
        }
        match self.jobs.status(self.job_id).await {
            Ok(Some(JobStatus::Processing)) => true,
            Ok(Some(JobStatus::Cancelled)) => {
                debug!("Job {} observed as cancelled by {} progress", self.job_id, self.kind);
                self.cancelled.cancel();
                false
            }
            Ok(Some(status)) => {
                debug!("Job {} is {}, dropping {} progress", self.job_id, status, self.kind);
                self.cancelled.cancel();
                false
            }
            Ok(None) => {
                warn!("Job {} disappeared while {} was running", self.job_id, self.kind);
                self.cancelled.cancel();
                false
            }
            Err(e) => {
                // Unknown status: skip this write but keep the agent running
                warn!("Failed to read status of job {}: {}", self.job_id, e);
                false
            }
        }
    }

    /// Persist a per-agent status change without touching its percentage.
    pub async fn mark(&self, status: AgentStatus, message: Option<String>) {
        let percent = match status {
            AgentStatus::Complete | AgentStatus::Cached => 100,
            _ => self.tracker.agent_percent(self.kind),
        };
        let overall = self.tracker.update(self.kind, percent);
        self.write(overall, percent, status, message).await;
    }

    async fn write(&self, overall: u8, percent: u8, status: AgentStatus, message: Option<String>) {
        if !self.still_processing().await {
            return;
        }
        let update = ProgressUpdate {
            percent: overall,
            step: message.as_ref().map(|m| format!("{}: {}", self.kind, m)),
            agent: Some((
                self.kind,
                AgentProgress {
                    status,
                    progress: percent,
                    message,
                },
            )),
            at: self.clock.now(),
        };
        match self.jobs.update_progress(self.job_id, update).await {
            Ok(true) => {}
            Ok(false) => debug!("Progress for job {} not applied (not processing)", self.job_id),
            Err(e) => warn!("Failed to persist progress for job {}: {}", self.job_id, e),
        }
    }
}

#[async_trait]
impl ProgressReporter for JobProgressSink {
    async fn report(&self, percent: u8, message: &str) {
        let percent = percent.min(100);
        let overall = self.tracker.update(self.kind, percent);
        let agent_percent = self.tracker.agent_percent(self.kind);
        self.write(overall, agent_percent, AgentStatus::Running, Some(message.to_string()))
            .await;
        if !self.cancelled.is_cancelled() {
            self.events.publish(JobEvent::AgentProgress {
                job_id: self.job_id,
                agent: self.kind,
                agent_percent,
                overall_percent: overall,
                message: message.to_string(),
            });
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }
}
