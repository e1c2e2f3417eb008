// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shared fixtures for the orchestration integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sparkplan_core::application::{AgentRegistration, JobOrchestrator, OrchestratorBuilder};
use sparkplan_core::domain::agent::{
    AgentCore, AgentOutput, CircuitDesign, DesignOutput, Hazard, InstallationOutput, InstallationStep,
    ProgressReporter, RetrievedContext, RiskAssessmentOutput, RiskLevel,
};
use sparkplan_core::domain::cache::{CacheEntry, CacheNamespace};
use sparkplan_core::domain::error::{ErrorKind, OrchestrationError};
use sparkplan_core::domain::job::{AgentKind, CircuitSpec, Job, JobId, JobInputs, JobStatus};
use sparkplan_core::domain::repository::{
    CacheStore, JobRepository, ProgressUpdate, RepositoryError,
};
use sparkplan_core::domain::retry::RetryPolicy;
use sparkplan_core::infrastructure::repositories::{InMemoryCacheStore, InMemoryJobRepository};
use sparkplan_cortex::{FacetType, InMemoryKnowledgeStore, RetrievalFacet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub fn circuit(name: &str, cable_length_m: f64) -> CircuitSpec {
    CircuitSpec {
        name: name.to_string(),
        circuit_type: "radial".to_string(),
        load_power_w: 2000.0,
        cable_length_m,
        voltage: 230.0,
        phases: 1,
        special_location: None,
    }
}

pub fn inputs(circuits: Vec<CircuitSpec>, agents: Vec<AgentKind>) -> JobInputs {
    JobInputs {
        project_name: "14 Mill Lane".to_string(),
        location: "Leeds".to_string(),
        installation_type: "domestic".to_string(),
        supply_voltage: 230.0,
        earthing_system: "TN-C-S".to_string(),
        circuits,
        additional_prompt: None,
        agents,
    }
}

pub fn numbered_circuits(count: usize) -> Vec<CircuitSpec> {
    (1..=count).map(|i| circuit(&format!("Circuit {}", i), 20.0)).collect()
}

/// Knowledge bases named like the default retrieval sources.
pub fn knowledge() -> Arc<InMemoryKnowledgeStore> {
    Arc::new(
        InMemoryKnowledgeStore::new()
            .with_base(
                "regulations",
                vec![
                    RetrievalFacet::new(
                        "reg-411",
                        FacetType::Regulation,
                        ["radial", "rcd", "domestic"],
                        "Socket outlets up to 32 A require 30 mA RCD protection.",
                    ),
                    RetrievalFacet::new(
                        "reg-525",
                        FacetType::Formula,
                        ["voltage", "drop", "radial"],
                        "Voltage drop for power circuits should not exceed 5%.",
                    ),
                ],
            )
            .with_base(
                "practical_work",
                vec![RetrievalFacet::new(
                    "pw-safe-zones",
                    FacetType::Example,
                    ["radial", "cable", "routing"],
                    "Run cables in safe zones vertically or horizontally from accessories.",
                )],
            )
            .with_base(
                "health_safety",
                vec![RetrievalFacet::new(
                    "hs-isolation",
                    FacetType::Concept,
                    ["isolation", "domestic"],
                    "Safe isolation: isolate, lock off, prove dead.",
                )],
            ),
    )
}

pub fn design_for(inputs: &JobInputs) -> AgentOutput {
    AgentOutput::Design(DesignOutput {
        summary: format!("{} circuits", inputs.circuits.len()),
        circuits: inputs
            .circuits
            .iter()
            .map(|c| CircuitDesign {
                name: c.name.clone(),
                cable_size_mm2: 2.5,
                cable_type: "6242Y".to_string(),
                protective_device: "B".to_string(),
                device_rating_a: 20.0,
                voltage_drop_percent: 1.8,
                max_zs_ohms: Some(2.19),
                compliant: true,
                notes: Vec::new(),
            })
            .collect(),
    })
}

pub fn output_for(kind: AgentKind, inputs: &JobInputs) -> AgentOutput {
    match kind {
        AgentKind::Designer => design_for(inputs),
        AgentKind::Installer => AgentOutput::Installation(InstallationOutput {
            summary: "Install".to_string(),
            steps: inputs
                .circuits
                .iter()
                .enumerate()
                .map(|(i, c)| InstallationStep {
                    step: i as u32 + 1,
                    title: format!("Install {}", c.name),
                    description: String::new(),
                    circuit: Some(c.name.clone()),
                })
                .collect(),
            materials: vec!["Cable".to_string()],
            tools: vec!["Tester".to_string()],
            testing: vec!["Insulation resistance".to_string()],
        }),
        AgentKind::HealthSafety => AgentOutput::RiskAssessment(RiskAssessmentOutput {
            hazards: vec![Hazard {
                hazard: "Electric shock".to_string(),
                risk_to: "Electrician".to_string(),
                likelihood: 2,
                severity: 5,
                risk_score: 10,
                risk_level: RiskLevel::High,
                controls: vec!["Safe isolation".to_string()],
            }],
            ppe: vec!["Insulated gloves".to_string()],
            emergency_procedures: Vec::new(),
        }),
    }
}

/// What a [`MockAgent`] does when run.
pub enum Behaviour {
    Succeed,
    Fail(ErrorKind),
    /// Sleeps `delay` before answering whenever the input has more than
    /// `circuits` circuits.
    SlowAbove { circuits: usize, delay: Duration },
    /// Signals `started`, then waits for `release` before answering.
    Gate { started: Arc<Notify>, release: Arc<Notify> },
}

pub struct MockAgent {
    kind: AgentKind,
    behaviour: Behaviour,
    calls: Arc<AtomicUsize>,
    circuit_counts: parking_lot::Mutex<Vec<usize>>,
}

impl MockAgent {
    pub fn new(kind: AgentKind, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            kind,
            behaviour,
            calls: Arc::new(AtomicUsize::new(0)),
            circuit_counts: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Circuit count of every input this agent was called with.
    pub fn circuit_counts(&self) -> Vec<usize> {
        self.circuit_counts.lock().clone()
    }
}

#[async_trait]
impl AgentCore for MockAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn name(&self) -> &str {
        "mock"
    }

    async fn run(
        &self,
        inputs: &JobInputs,
        progress: &dyn ProgressReporter,
        _context: &RetrievedContext,
    ) -> Result<AgentOutput, OrchestrationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.circuit_counts.lock().push(inputs.circuits.len());
        progress.report(50, "working").await;
        match &self.behaviour {
            Behaviour::Succeed => {}
            Behaviour::Fail(kind) => return Err(OrchestrationError::new(*kind, "mock failure")),
            Behaviour::SlowAbove { circuits, delay } => {
                if inputs.circuits.len() > *circuits {
                    tokio::time::sleep(*delay).await;
                }
            }
            Behaviour::Gate { started, release } => {
                started.notify_one();
                release.notified().await;
            }
        }
        progress.report(100, "done").await;
        Ok(output_for(self.kind, inputs))
    }
}

pub struct Harness {
    pub jobs: Arc<InMemoryJobRepository>,
    pub cache: Arc<InMemoryCacheStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(InMemoryJobRepository::new()),
            cache: Arc::new(InMemoryCacheStore::new()),
        }
    }

    /// Builder with fast retries and the given mocks registered.
    pub fn builder(&self, agents: Vec<AgentRegistration>) -> OrchestratorBuilder {
        builder_with(self.jobs.clone(), self.cache.clone(), agents)
    }
}

pub fn builder_with(
    jobs: Arc<dyn JobRepository>,
    cache: Arc<dyn CacheStore>,
    agents: Vec<AgentRegistration>,
) -> OrchestratorBuilder {
    let mut builder = JobOrchestrator::builder(jobs, cache, knowledge())
        .with_cache_config("test-secret", Default::default())
        .with_retry(RetryPolicy::none());
    for registration in agents {
        builder = builder.register_agent(registration);
    }
    builder
}

fn unavailable(what: &str) -> RepositoryError {
    RepositoryError::Database(format!("{} unavailable", what))
}

/// Cache store whose every operation fails.
#[derive(Default)]
pub struct FailingCacheStore {
    calls: AtomicUsize,
}

impl FailingCacheStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, RepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(unavailable("cache"))
    }
}

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get(&self, _namespace: CacheNamespace, _key: &str) -> Result<Option<CacheEntry>, RepositoryError> {
        self.fail()
    }

    async fn put(&self, _namespace: CacheNamespace, _entry: CacheEntry) -> Result<(), RepositoryError> {
        self.fail()
    }

    async fn record_hit(
        &self,
        _namespace: CacheNamespace,
        _key: &str,
        _at: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, RepositoryError> {
        self.fail()
    }

    async fn purge_expired(&self, _namespace: CacheNamespace, _now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        self.fail()
    }
}

/// In-memory job repository that rejects every progress write.
#[derive(Default)]
pub struct ProgressLosingRepository {
    inner: InMemoryJobRepository,
    rejected: AtomicUsize,
}

impl ProgressLosingRepository {
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRepository for ProgressLosingRepository {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        self.inner.save(job).await
    }

    async fn save_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, RepositoryError> {
        self.inner.save_if_status(job, expected).await
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn status(&self, id: JobId) -> Result<Option<JobStatus>, RepositoryError> {
        self.inner.status(id).await
    }

    async fn update_progress(&self, _id: JobId, _update: ProgressUpdate) -> Result<bool, RepositoryError> {
        self.rejected.fetch_add(1, Ordering::SeqCst);
        Err(unavailable("job store"))
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<Job>, RepositoryError> {
        self.inner.find_recent(limit).await
    }
}

pub fn registration(agent: &Arc<MockAgent>) -> AgentRegistration {
    AgentRegistration::new(agent.clone())
}
