// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod cache_layers;
pub mod progress;
pub mod retrieval;
pub mod agents;
pub mod agent_runner;
pub mod orchestrator;
pub mod repository_factory;

// Re-export use cases for convenience
pub use agent_runner::{AgentRegistration, AgentRunner, RunScope};
pub use cache_layers::{CacheLayer, CacheLayers};
pub use orchestrator::{standard_agents, JobOrchestrator, OrchestratorBuilder, ProcessResponse};
pub use progress::{CancellationFlag, JobProgressSink, ProgressTracker};
pub use repository_factory::{create_cache_store, create_job_repository, storage_backend, Repositories};
pub use retrieval::{RetrievalReport, SharedRetrieval};
