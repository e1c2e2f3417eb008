// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Job Orchestrator
//!
//! Drives one job through `pending → processing → {complete | failed | cancelled}`:
//!
//! 1. Terminal jobs return their recorded outcome, and a job another call is
//!    already processing is reported as in progress unless its heartbeat has
//!    gone stale. An L1 hit completes the job immediately with no agent work.
//! 2. The persisted status is checked for cancellation, then the job is
//!    marked processing.
//! 3. Shared retrieval runs once (L2-backed) and its context is handed to
//!    every agent.
//! 4. Each agent checks L3 independently; the rest run concurrently and are
//!    joined without short-circuiting while a heartbeat keeps `updated_at`
//!    fresh.
//! 5. Any agent failure fails the job. Successful fresh outputs are still
//!    written to L3.
//! 6. Outputs are merged, written to L1 and the job is completed only if it is
//!    still processing, so a concurrent cancel wins.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sparkplan_cortex::{KeywordExtractor, KnowledgeStore, Retriever};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::application::agent_runner::{AgentRegistration, AgentRunner, RunScope};
use crate::application::agents::{
    CompletionStep, DesignerAgent, HealthSafetyAgent, InstallerAgent, TemplateInstallerAgent,
};
use crate::application::cache_layers::CacheLayers;
use crate::application::progress::{CancellationFlag, JobProgressSink, ProgressTracker};
use crate::application::retrieval::SharedRetrieval;
use crate::domain::agent::{AgentOutput, JobResult, ResultMetadata};
use crate::domain::cache::{CacheLookup, CacheNamespace};
use crate::domain::cache_key::CacheKeyer;
use crate::domain::circuit_breaker::BreakerRegistry;
use crate::domain::clock::{to_chrono, Clock, SystemClock};
use crate::domain::config::{AgentsConfig, CacheConfig, OrchestratorConfigManifest, RetrievalConfig};
use crate::domain::error::ErrorKind;
use crate::domain::events::JobEvent;
use crate::domain::job::{AgentKind, AgentProgress, AgentStatus, Job, JobError, JobId, JobInputs, JobStatus};
use crate::domain::llm::{CompletionProvider, GenerationOptions};
use crate::domain::repository::{CacheStore, JobRepository, ProgressUpdate};
use crate::domain::retry::RetryPolicy;
use crate::domain::split;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::prompt_template_engine::PromptTemplateEngine;

const CANCEL_ATTEMPTS: usize = 3;

/// Outcome of one `process` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub job_id: JobId,
    pub success: bool,
    pub cached: bool,
    pub cancelled: bool,
    /// Another call is still processing the job
    #[serde(default)]
    pub in_progress: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessResponse {
    fn completed(job_id: JobId, cached: bool) -> Self {
        Self {
            job_id,
            success: true,
            cached,
            cancelled: false,
            in_progress: false,
            error: None,
        }
    }

    fn cancelled(job_id: JobId) -> Self {
        Self {
            job_id,
            success: false,
            cached: false,
            cancelled: true,
            in_progress: false,
            error: None,
        }
    }

    fn failed(job_id: JobId, error: impl Into<String>) -> Self {
        Self {
            job_id,
            success: false,
            cached: false,
            cancelled: false,
            in_progress: false,
            error: Some(error.into()),
        }
    }

    fn in_progress(job_id: JobId) -> Self {
        Self {
            job_id,
            success: false,
            cached: false,
            cancelled: false,
            in_progress: true,
            error: None,
        }
    }

    /// Response describing a job that is already terminal.
    pub fn from_terminal(job: &Job) -> Self {
        match job.status {
            JobStatus::Complete => Self::completed(job.id, false),
            JobStatus::Cancelled => Self::cancelled(job.id),
            _ => Self::failed(
                job.id,
                job.error.clone().unwrap_or_else(|| format!("job is {}", job.status)),
            ),
        }
    }
}

pub struct JobOrchestrator {
    jobs: Arc<dyn JobRepository>,
    caches: CacheLayers,
    keyer: Arc<CacheKeyer>,
    retrieval: SharedRetrieval,
    agents: BTreeMap<AgentKind, AgentRegistration>,
    runner: AgentRunner,
    breakers: Arc<BreakerRegistry>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    progress_weights: BTreeMap<AgentKind, u32>,
    stale_after: Duration,
}

impl JobOrchestrator {
    pub fn builder(
        jobs: Arc<dyn JobRepository>,
        cache_store: Arc<dyn CacheStore>,
        knowledge: Arc<dyn KnowledgeStore>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(jobs, cache_store, knowledge)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn caches(&self) -> &CacheLayers {
        &self.caches
    }

    pub fn retrieval(&self) -> &SharedRetrieval {
        &self.retrieval
    }

    /// Validate inputs and record a pending job.
    pub async fn submit(&self, inputs: JobInputs) -> Result<JobId, JobError> {
        inputs.validate()?;
        let mut inputs = inputs;
        inputs.agents.sort();
        inputs.agents.dedup();

        let job = Job::new(inputs, self.clock.now());
        self.jobs.save(&job).await?;
        info!("Submitted job {} with {} circuits", job.id, job.inputs.circuits.len());
        self.events.publish(JobEvent::JobSubmitted {
            job_id: job.id,
            circuit_count: job.inputs.circuits.len(),
            agents: job.inputs.agents.clone(),
            submitted_at: job.created_at,
        });
        Ok(job.id)
    }

    pub async fn get(&self, id: JobId) -> Result<Job, JobError> {
        self.jobs.find_by_id(id).await?.ok_or(JobError::NotFound(id))
    }

    pub async fn list_recent(&self, limit: usize) -> Result<Vec<Job>, JobError> {
        Ok(self.jobs.find_recent(limit).await?)
    }

    /// Cancel a non-terminal job. Returns false when it was already terminal.
    pub async fn cancel(&self, id: JobId) -> Result<bool, JobError> {
        for _ in 0..CANCEL_ATTEMPTS {
            let mut job = self.get(id).await?;
            if job.is_terminal() {
                debug!("Job {} already {}, nothing to cancel", id, job.status);
                return Ok(false);
            }
            let expected = job.status;
            let now = self.clock.now();
            job.cancel(now)?;
            if self.jobs.save_if_status(&job, expected).await? {
                info!("Cancelled job {}", id);
                self.events.publish(JobEvent::JobCancelled {
                    job_id: id,
                    cancelled_at: now,
                });
                return Ok(true);
            }
            debug!("Job {} changed status during cancel, retrying", id);
        }
        let job = self.get(id).await?;
        if job.is_terminal() {
            return Ok(false);
        }
        Err(JobError::InvalidTransition {
            from: job.status,
            to: JobStatus::Cancelled,
        })
    }

    pub async fn process(&self, id: JobId) -> Result<ProcessResponse, JobError> {
        let started = Instant::now();
        let mut job = self.get(id).await?;
        if job.is_terminal() {
            return Ok(ProcessResponse::from_terminal(&job));
        }
        if job.status == JobStatus::Processing {
            if !job.is_stale(self.clock.now(), to_chrono(self.stale_after)) {
                info!("Job {} is already being processed", id);
                return Ok(ProcessResponse::in_progress(id));
            }
            warn!("Job {} has not reported since {}, resuming it", id, job.updated_at);
        }

        let l1_key = self.keyer.full_result(&job.inputs);
        if let CacheLookup::Hit { data, hit_count, age } = self.caches.full_result.check(&l1_key).await {
            info!("Job {} served from L1 (entry age {}s)", id, age.num_seconds());
            self.events.publish(JobEvent::CacheHit {
                job_id: id,
                layer: CacheNamespace::FullResult,
                agent: None,
                hit_count,
            });
            return self.complete_from_cache(job, data, started).await;
        }

        if self.jobs.status(id).await? == Some(JobStatus::Cancelled) {
            info!("Job {} cancelled before processing", id);
            return Ok(ProcessResponse::cancelled(id));
        }
        let expected = job.status;
        let now = self.clock.now();
        job.start(now)?;
        job.current_step = Some("Retrieving reference material".to_string());
        if !self.jobs.save_if_status(&job, expected).await? {
            return self.outcome_of(id).await;
        }
        self.events.publish(JobEvent::JobStarted {
            job_id: id,
            started_at: now,
        });

        let report = match self.retrieval.retrieve(&job.inputs.retrieval_query()).await {
            Ok(report) => report,
            Err(e) => {
                error!("Retrieval failed for job {}: {}", id, e);
                return self.fail(id, format!("retrieval failed: {}", e)).await;
            }
        };
        self.events.publish(JobEvent::RetrievalCompleted {
            job_id: id,
            keyword_count: report.context.keywords.len(),
            result_count: report.context.facets.len(),
            from_cache: report.from_cache,
        });
        let context = report.context;

        let requested = job.inputs.agents.clone();
        let tracker = Arc::new(ProgressTracker::new(&requested, &self.progress_weights));
        let cancelled = CancellationFlag::new();
        let sink_for = |kind: AgentKind| {
            JobProgressSink::new(
                id,
                kind,
                tracker.clone(),
                self.jobs.clone(),
                self.events.clone(),
                self.clock.clone(),
                cancelled.clone(),
            )
        };

        let mut outputs: BTreeMap<AgentKind, AgentOutput> = BTreeMap::new();
        let mut from_cache = Vec::new();
        let mut to_run = Vec::new();
        for kind in &requested {
            let Some(registration) = self.agents.get(kind) else {
                return self.fail(id, format!("no agent registered for {}", kind)).await;
            };
            let key = self.keyer.partial(&job.inputs, *kind);
            match self.caches.check_partial(&key, *kind).await {
                CacheLookup::Hit { data, hit_count, .. } => {
                    debug!("Job {}: {} served from L3", id, kind);
                    self.events.publish(JobEvent::CacheHit {
                        job_id: id,
                        layer: CacheNamespace::Partial,
                        agent: Some(*kind),
                        hit_count,
                    });
                    sink_for(*kind).mark(AgentStatus::Cached, Some("Reused cached output".into())).await;
                    outputs.insert(*kind, data);
                    from_cache.push(*kind);
                }
                CacheLookup::Miss => to_run.push((registration, key)),
            }
        }

        if self.jobs.status(id).await? == Some(JobStatus::Cancelled) {
            info!("Job {} cancelled before agents started", id);
            return Ok(ProcessResponse::cancelled(id));
        }

        self.note_step(id, "Running agents").await;
        let inputs = &job.inputs;
        let context_ref = &context;
        let runs = to_run.into_iter().map(|(registration, key)| {
            let sink = sink_for(registration.kind());
            async move {
                let kind = registration.kind();
                sink.mark(AgentStatus::Running, Some("Started".into())).await;
                self.events.publish(JobEvent::AgentStarted {
                    job_id: id,
                    agent: kind,
                    started_at: self.clock.now(),
                });

                let agent_started = Instant::now();
                let scope = RunScope {
                    job_id: id,
                    progress: &sink,
                    context: context_ref,
                };
                let result = self.runner.run(registration, inputs, scope).await;
                match &result {
                    Ok(output) => {
                        self.caches.partial.store(&key, output).await;
                        sink.mark(AgentStatus::Complete, None).await;
                        self.events.publish(JobEvent::AgentCompleted {
                            job_id: id,
                            agent: kind,
                            item_count: output.item_count(),
                            duration_ms: agent_started.elapsed().as_millis() as u64,
                        });
                    }
                    Err(e) if e.kind == ErrorKind::Cancelled => {
                        debug!("Job {}: {} stopped after cancellation", id, kind);
                    }
                    Err(e) => {
                        warn!("Job {}: {} failed: {}", id, kind, e);
                        sink.mark(AgentStatus::Failed, Some(e.to_string())).await;
                        self.events.publish(JobEvent::AgentFailed {
                            job_id: id,
                            agent: kind,
                            kind: e.kind,
                            error: e.message.clone(),
                        });
                    }
                }
                (kind, result)
            }
        });
        let results = self.with_heartbeat(id, join_all(runs)).await;

        if self.jobs.status(id).await? == Some(JobStatus::Cancelled) {
            info!("Job {} cancelled while agents were running", id);
            return Ok(ProcessResponse::cancelled(id));
        }

        let mut failures = Vec::new();
        for (kind, result) in results {
            match result {
                Ok(output) => {
                    outputs.insert(kind, output);
                }
                Err(e) => failures.push(format!("{}: {}", kind, e)),
            }
        }
        if !failures.is_empty() {
            return self
                .fail(id, format!("agent(s) failed: {}", failures.join("; ")))
                .await;
        }

        let metadata = ResultMetadata {
            generation_time_ms: started.elapsed().as_millis() as u64,
            rag_source_count: context.facets.len(),
            agents_from_cache: from_cache,
        };
        let result = JobResult::assemble(outputs, &context, metadata);
        self.caches.full_result.store(&l1_key, &result).await;
        self.finish(id, result, started).await
    }

    async fn complete_from_cache(
        &self,
        mut job: Job,
        result: JobResult,
        started: Instant,
    ) -> Result<ProcessResponse, JobError> {
        let id = job.id;
        let expected = job.status;
        let now = self.clock.now();
        for kind in job.inputs.agents.clone() {
            job.set_agent(
                kind,
                AgentProgress {
                    status: AgentStatus::Cached,
                    progress: 100,
                    message: None,
                },
            );
        }
        job.start(now)?;
        job.complete(result, now)?;
        if !self.jobs.save_if_status(&job, expected).await? {
            return self.outcome_of(id).await;
        }
        self.events.publish(JobEvent::JobCompleted {
            job_id: id,
            cached: true,
            generation_time_ms: started.elapsed().as_millis() as u64,
            completed_at: now,
        });
        Ok(ProcessResponse::completed(id, true))
    }

    async fn finish(&self, id: JobId, result: JobResult, started: Instant) -> Result<ProcessResponse, JobError> {
        let mut job = self.get(id).await?;
        if job.status != JobStatus::Processing {
            return Ok(ProcessResponse::from_terminal(&job));
        }
        let now = self.clock.now();
        job.complete(result, now)?;
        if !self.jobs.save_if_status(&job, JobStatus::Processing).await? {
            return self.outcome_of(id).await;
        }
        let generation_time_ms = started.elapsed().as_millis() as u64;
        info!("Job {} complete in {} ms", id, generation_time_ms);
        self.events.publish(JobEvent::JobCompleted {
            job_id: id,
            cached: false,
            generation_time_ms,
            completed_at: now,
        });
        Ok(ProcessResponse::completed(id, false))
    }

    async fn fail(&self, id: JobId, message: String) -> Result<ProcessResponse, JobError> {
        let mut job = self.get(id).await?;
        if job.is_terminal() {
            return Ok(ProcessResponse::from_terminal(&job));
        }
        let expected = job.status;
        let now = self.clock.now();
        job.fail(message.clone(), now)?;
        if !self.jobs.save_if_status(&job, expected).await? {
            return self.outcome_of(id).await;
        }
        error!("Job {} failed: {}", id, message);
        self.events.publish(JobEvent::JobFailed {
            job_id: id,
            error: message.clone(),
            failed_at: now,
        });
        Ok(ProcessResponse::failed(id, message))
    }

    /// Response for a job another writer moved on.
    async fn outcome_of(&self, id: JobId) -> Result<ProcessResponse, JobError> {
        let job = self.get(id).await?;
        if job.is_terminal() {
            Ok(ProcessResponse::from_terminal(&job))
        } else if job.status == JobStatus::Processing {
            Ok(ProcessResponse::in_progress(id))
        } else {
            Ok(ProcessResponse::failed(
                id,
                format!("job status changed concurrently to {}", job.status),
            ))
        }
    }

    /// Best-effort step label for a processing job.
    async fn note_step(&self, id: JobId, step: &str) {
        let update = ProgressUpdate {
            percent: 0,
            step: Some(step.to_string()),
            agent: None,
            at: self.clock.now(),
        };
        if let Err(e) = self.jobs.update_progress(id, update).await {
            warn!("Failed to record step for job {}: {}", id, e);
        }
    }

    /// Drives `work` to completion, touching the job's `updated_at` every
    /// third of the stale threshold.
    async fn with_heartbeat<T>(&self, id: JobId, work: impl Future<Output = T>) -> T {
        let period = (self.stale_after / 3).max(Duration::from_millis(10));
        let mut beat = tokio::time::interval(period);
        beat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        beat.tick().await;
        tokio::pin!(work);
        loop {
            tokio::select! {
                output = &mut work => return output,
                _ = beat.tick() => self.heartbeat(id).await,
            }
        }
    }

    async fn heartbeat(&self, id: JobId) {
        let update = ProgressUpdate {
            percent: 0,
            step: None,
            agent: None,
            at: self.clock.now(),
        };
        match self.jobs.update_progress(id, update).await {
            Ok(true) => debug!("Heartbeat for job {}", id),
            Ok(false) => debug!("Job {} no longer processing, heartbeat skipped", id),
            Err(e) => warn!("Failed to record heartbeat for job {}: {}", id, e),
        }
    }

    /// Remove expired rows from every cache layer.
    pub async fn purge_expired_cache(&self) -> u64 {
        self.caches.purge_expired().await
    }
}

/// Assembles a [`JobOrchestrator`]; every part has a working default.
pub struct OrchestratorBuilder {
    jobs: Arc<dyn JobRepository>,
    cache_store: Arc<dyn CacheStore>,
    knowledge: Arc<dyn KnowledgeStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    breakers: Option<Arc<BreakerRegistry>>,
    cache_secret: String,
    cache: CacheConfig,
    retry: RetryPolicy,
    retrieval: RetrievalConfig,
    agent_timeout: Duration,
    stale_after: Duration,
    progress_weights: BTreeMap<AgentKind, u32>,
    agents: BTreeMap<AgentKind, AgentRegistration>,
}

impl OrchestratorBuilder {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        cache_store: Arc<dyn CacheStore>,
        knowledge: Arc<dyn KnowledgeStore>,
    ) -> Self {
        let cache = CacheConfig::default();
        let agents = AgentsConfig::default();
        Self {
            jobs,
            cache_store,
            knowledge,
            clock: Arc::new(SystemClock),
            events: EventBus::default(),
            breakers: None,
            cache_secret: cache.secret.clone(),
            cache,
            retry: RetryPolicy::default(),
            retrieval: RetrievalConfig::default(),
            agent_timeout: agents.timeout,
            stale_after: agents.stale_after,
            progress_weights: agents.progress_weights,
            agents: BTreeMap::new(),
        }
    }

    /// Builder configured from a manifest, with the standard agent cores
    /// registered against `provider`.
    pub fn from_config(
        config: &OrchestratorConfigManifest,
        jobs: Arc<dyn JobRepository>,
        cache_store: Arc<dyn CacheStore>,
        knowledge: Arc<dyn KnowledgeStore>,
        provider: Arc<dyn CompletionProvider>,
    ) -> anyhow::Result<Self> {
        let spec = &config.spec;
        let mut breakers = BreakerRegistry::new(spec.breaker.defaults.clone());
        for (name, override_config) in &spec.breaker.overrides {
            breakers = breakers.with_override(name.clone(), override_config.clone());
        }

        let options = match &spec.completion {
            Some(completion) => GenerationOptions {
                max_tokens: Some(completion.max_tokens),
                temperature: Some(completion.temperature),
                ..GenerationOptions::default()
            },
            None => GenerationOptions::default(),
        };
        let step = CompletionStep::new(
            provider,
            Arc::new(PromptTemplateEngine::new()),
            options,
            spec.agents.max_context_facets,
        );

        let mut builder = Self::new(jobs, cache_store, knowledge)
            .with_cache_config(config.cache_secret()?, spec.cache.clone())
            .with_breakers(Arc::new(breakers))
            .with_retry(spec.retry.clone())
            .with_retrieval_config(spec.retrieval.clone())
            .with_agent_timeout(spec.agents.timeout)
            .with_stale_after(spec.agents.stale_after)
            .with_progress_weights(spec.agents.progress_weights.clone());
        for registration in standard_agents(&spec.agents, step) {
            builder = builder.register_agent(registration);
        }
        Ok(builder)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_breakers(mut self, breakers: Arc<BreakerRegistry>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    pub fn with_cache_config(mut self, secret: impl Into<String>, cache: CacheConfig) -> Self {
        self.cache_secret = secret.into();
        self.cache = cache;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_retrieval_config(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    /// How long a processing job may go without a heartbeat before another
    /// `process` call may resume it.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_progress_weights(mut self, weights: BTreeMap<AgentKind, u32>) -> Self {
        self.progress_weights = weights;
        self
    }

    /// Register (or replace) the core for its agent kind.
    pub fn register_agent(mut self, registration: AgentRegistration) -> Self {
        self.agents.insert(registration.kind(), registration);
        self
    }

    pub fn build(self) -> JobOrchestrator {
        let breakers = self
            .breakers
            .unwrap_or_else(|| Arc::new(BreakerRegistry::with_clock(Default::default(), self.clock.clone())));
        let keyer = Arc::new(CacheKeyer::new(self.cache_secret).with_query_max_chars(self.cache.query_max_chars));
        let caches = CacheLayers::new(self.cache_store, self.clock.clone(), &self.cache);

        let retriever = Retriever::new(self.knowledge, self.retrieval.sources.clone())
            .with_extractor(KeywordExtractor::new(self.retrieval.max_keywords))
            .with_rrf_k(self.retrieval.rrf_k)
            .with_result_limit(self.retrieval.result_limit);
        let retrieval = SharedRetrieval::new(
            retriever,
            caches.retrieval.clone(),
            keyer.clone(),
            breakers.clone(),
            self.retry.clone(),
            &self.retrieval,
        );
        let runner = AgentRunner::new(breakers.clone(), self.retry, self.agent_timeout, self.events.clone());

        JobOrchestrator {
            jobs: self.jobs,
            caches,
            keyer,
            retrieval,
            agents: self.agents,
            runner,
            breakers,
            events: self.events,
            clock: self.clock,
            progress_weights: self.progress_weights,
            stale_after: self.stale_after,
        }
    }
}

/// Designer (optionally split by circuits), installer with template
/// fallback, and health & safety.
pub fn standard_agents(config: &AgentsConfig, step: CompletionStep) -> Vec<AgentRegistration> {
    let mut designer = AgentRegistration::new(Arc::new(DesignerAgent::new(step.clone())));
    if config.designer_split.enabled {
        designer = designer.with_split(split::by_circuits(
            config.designer_split.threshold,
            config.designer_split.max_split_depth,
        ));
    }

    let mut installer = AgentRegistration::new(Arc::new(InstallerAgent::new(step.clone())));
    if config.installer_fallback {
        installer = installer.with_fallback(Arc::new(TemplateInstallerAgent::new()));
    }

    let health_safety = AgentRegistration::new(Arc::new(HealthSafetyAgent::new(step)));
    vec![designer, installer, health_safety]
}
