// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedded mode execution
//!
//! Creates the orchestrator and its services in-process from the loaded
//! configuration and runs jobs directly.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use sparkplan_core::{
    application::{storage_backend, JobOrchestrator, OrchestratorBuilder, ProcessResponse, Repositories},
    domain::{
        config::OrchestratorConfigManifest,
        job::{Job, JobInputs},
    },
    infrastructure::llm::create_provider,
};
use sparkplan_cortex::InMemoryKnowledgeStore;

pub struct EmbeddedRunner {
    orchestrator: JobOrchestrator,
}

impl EmbeddedRunner {
    /// Build an orchestrator from configuration. `knowledge` overrides
    /// `spec.retrieval.knowledge_path`.
    pub async fn new(config: &OrchestratorConfigManifest, knowledge: Option<&Path>) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;

        let completion = config
            .spec
            .completion
            .as_ref()
            .context("spec.completion must be configured to run jobs")?;
        let provider = create_provider(completion).context("Failed to initialize completion provider")?;

        let knowledge_path = knowledge
            .map(Path::to_path_buf)
            .or_else(|| config.spec.retrieval.knowledge_path.clone())
            .context("No knowledge file given (use --knowledge or spec.retrieval.knowledge_path)")?;
        let knowledge = load_knowledge(&knowledge_path)?;

        let repositories = Repositories::connect(&storage_backend(&config.spec))
            .await
            .context("Failed to initialize job storage")?;

        let orchestrator = OrchestratorBuilder::from_config(
            config,
            repositories.jobs,
            repositories.cache,
            Arc::new(knowledge),
            provider,
        )?
        .build();

        Ok(Self { orchestrator })
    }

    pub fn orchestrator(&self) -> &JobOrchestrator {
        &self.orchestrator
    }

    /// Submit and process one job; returns the outcome and the final job record.
    pub async fn run(&self, inputs: JobInputs) -> Result<(ProcessResponse, Job)> {
        let id = self.orchestrator.submit(inputs).await.context("Job rejected")?;
        info!("Processing job {}", id);
        let response = self.orchestrator.process(id).await?;
        let job = self.orchestrator.get(id).await?;
        Ok((response, job))
    }
}

pub fn load_knowledge(path: &Path) -> Result<InMemoryKnowledgeStore> {
    InMemoryKnowledgeStore::from_json_file(path)
        .with_context(|| format!("Failed to load knowledge file {:?}", path))
}

/// Job inputs from a JSON or YAML file, picked by extension.
pub fn load_inputs(path: &PathBuf) -> Result<JobInputs> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
    let inputs = if is_yaml {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid job inputs in {:?}", path))?
    } else {
        serde_json::from_str(&content).with_context(|| format!("Invalid job inputs in {:?}", path))?
    };
    Ok(inputs)
}
