// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Job Aggregate
//!
//! One user request spanning one or more agent computations.
//!
//! ```text
//! pending ──► processing ──► complete
//!    │            ├────────► failed
//!    └────────────┴────────► cancelled
//! ```
//!
//! A pending job may also jump straight to `complete` on a full-result cache
//! hit. Terminal jobs reject every further transition, and overall progress
//! only ever rises while the job is processing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::domain::agent::JobResult;
use crate::domain::repository::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "complete" => Some(JobStatus::Complete),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Designer,
    Installer,
    HealthSafety,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::Designer, AgentKind::Installer, AgentKind::HealthSafety];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Designer => "designer",
            AgentKind::Installer => "installer",
            AgentKind::HealthSafety => "health_safety",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One circuit to be designed and installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSpec {
    pub name: String,

    /// e.g. "shower", "ring_final", "lighting", "cooker", "ev_charger"
    pub circuit_type: String,

    pub load_power_w: f64,

    pub cable_length_m: f64,

    #[serde(default = "default_voltage")]
    pub voltage: f64,

    #[serde(default = "default_phases")]
    pub phases: u8,

    /// Special location per BS 7671 Part 7 (bathroom, outdoor, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_location: Option<String>,
}

fn default_voltage() -> f64 {
    230.0
}

fn default_phases() -> u8 {
    1
}

fn default_earthing() -> String {
    "TN-C-S".to_string()
}

fn default_agents() -> Vec<AgentKind> {
    AgentKind::ALL.to_vec()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInputs {
    pub project_name: String,

    #[serde(default)]
    pub location: String,

    /// "domestic", "commercial" or "industrial"
    #[serde(default)]
    pub installation_type: String,

    #[serde(default = "default_voltage")]
    pub supply_voltage: f64,

    #[serde(default = "default_earthing")]
    pub earthing_system: String,

    pub circuits: Vec<CircuitSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_prompt: Option<String>,

    #[serde(default = "default_agents")]
    pub agents: Vec<AgentKind>,
}

impl JobInputs {
    pub fn validate(&self) -> Result<(), JobError> {
        if self.circuits.is_empty() {
            return Err(JobError::InvalidInputs("at least one circuit is required".into()));
        }
        if self.agents.is_empty() {
            return Err(JobError::InvalidInputs("at least one agent must be requested".into()));
        }
        if !(self.supply_voltage.is_finite() && self.supply_voltage > 0.0) {
            return Err(JobError::InvalidInputs("supply_voltage must be positive".into()));
        }
        for circuit in &self.circuits {
            let positive = |v: f64| v.is_finite() && v > 0.0;
            if !positive(circuit.cable_length_m) {
                return Err(JobError::InvalidInputs(format!(
                    "circuit '{}': cable_length_m must be positive",
                    circuit.name
                )));
            }
            if !positive(circuit.load_power_w) {
                return Err(JobError::InvalidInputs(format!(
                    "circuit '{}': load_power_w must be positive",
                    circuit.name
                )));
            }
            if !positive(circuit.voltage) {
                return Err(JobError::InvalidInputs(format!(
                    "circuit '{}': voltage must be positive",
                    circuit.name
                )));
            }
            if circuit.phases != 1 && circuit.phases != 3 {
                return Err(JobError::InvalidInputs(format!(
                    "circuit '{}': phases must be 1 or 3",
                    circuit.name
                )));
            }
        }
        Ok(())
    }

    pub fn wants(&self, kind: AgentKind) -> bool {
        self.agents.contains(&kind)
    }

    /// Free text describing the job for keyword retrieval.
    pub fn retrieval_query(&self) -> String {
        let mut parts = vec![
            self.installation_type.clone(),
            self.earthing_system.clone(),
        ];
        for circuit in &self.circuits {
            parts.push(circuit.circuit_type.replace('_', " "));
            if let Some(location) = &circuit.special_location {
                parts.push(location.clone());
            }
        }
        if let Some(prompt) = &self.additional_prompt {
            parts.push(prompt.clone());
        }
        parts.retain(|p| !p.trim().is_empty());
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Running,
    Complete,
    Cached,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProgress {
    pub status: AgentStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AgentProgress {
    pub fn pending() -> Self {
        Self {
            status: AgentStatus::Pending,
            progress: 0,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub inputs: JobInputs,
    pub agents: BTreeMap<AgentKind, AgentProgress>,
    pub progress: u8,
    pub current_step: Option<String>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(inputs: JobInputs, now: DateTime<Utc>) -> Self {
        let agents = inputs
            .agents
            .iter()
            .map(|kind| (*kind, AgentProgress::pending()))
            .collect();
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            inputs,
            agents,
            progress: 0,
            current_step: None,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_active(&self, to: JobStatus) -> Result<(), JobError> {
        if self.is_terminal() {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    /// Pending → processing. A processing job may be started again to resume
    /// a run that stopped heartbeating; see [`Job::is_stale`].
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), JobError> {
        self.ensure_active(JobStatus::Processing)?;
        if self.status == JobStatus::Pending {
            self.started_at = Some(now);
        }
        self.status = JobStatus::Processing;
        self.current_step = Some("Starting".to_string());
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, result: JobResult, now: DateTime<Utc>) -> Result<(), JobError> {
        self.ensure_active(JobStatus::Complete)?;
        self.status = JobStatus::Complete;
        self.progress = 100;
        self.current_step = Some("Complete".to_string());
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), JobError> {
        self.ensure_active(JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.current_step = Some("Failed".to_string());
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), JobError> {
        self.ensure_active(JobStatus::Cancelled)?;
        self.status = JobStatus::Cancelled;
        self.current_step = Some("Cancelled".to_string());
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Raises overall progress; lower values and non-processing jobs are ignored.
    /// True for a processing job not touched within `after`.
    pub fn is_stale(&self, now: DateTime<Utc>, after: chrono::Duration) -> bool {
        self.status == JobStatus::Processing && now - self.updated_at >= after
    }

    pub fn record_progress(&mut self, percent: u8, step: Option<String>, now: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Processing || percent <= self.progress {
            return false;
        }
        self.progress = percent.min(100);
        if step.is_some() {
            self.current_step = step;
        }
        self.updated_at = now;
        true
    }

    pub fn set_agent(&mut self, kind: AgentKind, progress: AgentProgress) {
        self.agents.insert(kind, progress);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Invalid job inputs: {0}")]
    InvalidInputs(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
