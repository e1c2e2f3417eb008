// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Contract
//!
//! An agent core is a stateless unit of generation logic:
//! `run(inputs, progress, context) -> AgentOutput`. Outputs are a closed
//! tagged union so cached payloads can be validated on read, and the merged
//! [`JobResult`] carries one optional section per agent kind.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sparkplan_cortex::{FusedResult, RetrievalFacet};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::error::OrchestrationError;
use crate::domain::job::{AgentKind, JobInputs};

/// Sized cable and protection for one circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitDesign {
    pub name: String,
    #[serde(default)]
    pub cable_size_mm2: f64,
    #[serde(default)]
    pub cable_type: String,
    #[serde(default)]
    pub protective_device: String,
    #[serde(default)]
    pub device_rating_a: f64,
    #[serde(default)]
    pub voltage_drop_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zs_ohms: Option<f64>,
    #[serde(default = "default_true")]
    pub compliant: bool,
    #[serde(default)]
    pub notes: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignOutput {
    #[serde(default)]
    pub summary: String,
    pub circuits: Vec<CircuitDesign>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationStep {
    pub step: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationOutput {
    #[serde(default)]
    pub summary: String,
    pub steps: Vec<InstallationStep>,
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub testing: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    /// Bands on a 5×5 likelihood × severity matrix.
    pub fn from_score(score: u8) -> Self {
        match score {
            15.. => RiskLevel::VeryHigh,
            10..=14 => RiskLevel::High,
            6..=9 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hazard {
    pub hazard: String,
    #[serde(default)]
    pub risk_to: String,
    pub likelihood: u8,
    pub severity: u8,
    #[serde(default)]
    pub risk_score: u8,
    #[serde(default = "default_risk_level")]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub controls: Vec<String>,
}

fn default_risk_level() -> RiskLevel {
    RiskLevel::Low
}

impl Hazard {
    /// Clamp both axes to 1..=5 and recompute score and band from them.
    pub fn rescore(&mut self) {
        self.likelihood = self.likelihood.clamp(1, 5);
        self.severity = self.severity.clamp(1, 5);
        self.risk_score = self.likelihood * self.severity;
        self.risk_level = RiskLevel::from_score(self.risk_score);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessmentOutput {
    pub hazards: Vec<Hazard>,
    #[serde(default)]
    pub ppe: Vec<String>,
    #[serde(default)]
    pub emergency_procedures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "agent", content = "output", rename_all = "snake_case")]
pub enum AgentOutput {
    Design(DesignOutput),
    Installation(InstallationOutput),
    RiskAssessment(RiskAssessmentOutput),
}

impl AgentOutput {
    pub fn kind(&self) -> AgentKind {
        match self {
            AgentOutput::Design(_) => AgentKind::Designer,
            AgentOutput::Installation(_) => AgentKind::Installer,
            AgentOutput::RiskAssessment(_) => AgentKind::HealthSafety,
        }
    }

    /// Number of per-circuit or per-hazard items, used in logs.
    pub fn item_count(&self) -> usize {
        match self {
            AgentOutput::Design(d) => d.circuits.len(),
            AgentOutput::Installation(i) => i.steps.len(),
            AgentOutput::RiskAssessment(r) => r.hazards.len(),
        }
    }

    /// Concatenate two outputs of the same kind produced from split inputs.
    pub fn merge(self, other: AgentOutput) -> Result<AgentOutput, OrchestrationError> {
        match (self, other) {
            (AgentOutput::Design(mut a), AgentOutput::Design(b)) => {
                a.summary = join_summaries(&a.summary, &b.summary);
                a.circuits.extend(b.circuits);
                Ok(AgentOutput::Design(a))
            }
            (AgentOutput::Installation(mut a), AgentOutput::Installation(b)) => {
                a.summary = join_summaries(&a.summary, &b.summary);
                a.steps.extend(b.steps);
                for (i, step) in a.steps.iter_mut().enumerate() {
                    step.step = i as u32 + 1;
                }
                extend_unique(&mut a.materials, b.materials);
                extend_unique(&mut a.tools, b.tools);
                extend_unique(&mut a.testing, b.testing);
                Ok(AgentOutput::Installation(a))
            }
            (AgentOutput::RiskAssessment(mut a), AgentOutput::RiskAssessment(b)) => {
                a.hazards.extend(b.hazards);
                extend_unique(&mut a.ppe, b.ppe);
                extend_unique(&mut a.emergency_procedures, b.emergency_procedures);
                Ok(AgentOutput::RiskAssessment(a))
            }
            (a, b) => Err(OrchestrationError::validation(format!(
                "cannot merge {} output with {} output",
                a.kind(),
                b.kind()
            ))),
        }
    }
}

fn join_summaries(a: &str, b: &str) -> String {
    match (a.trim().is_empty(), b.trim().is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{}\n{}", a, b),
    }
}

fn extend_unique(target: &mut Vec<String>, more: Vec<String>) {
    for item in more {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Shared retrieval result handed to every agent of one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub keywords: Vec<String>,
    pub facets: Vec<FusedResult<RetrievalFacet>>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    pub fn citations(&self) -> Vec<SourceCitation> {
        self.facets
            .iter()
            .map(|f| SourceCitation {
                id: f.item.id.0.clone(),
                facet_type: f.item.facet_type.as_str().to_string(),
                category: f.item.category.clone(),
                score: f.score,
                sources: f.sources.clone(),
            })
            .collect()
    }

    /// Numbered reference block for prompts, best facets first.
    pub fn prompt_block(&self, max_facets: usize) -> String {
        self.facets
            .iter()
            .take(max_facets)
            .enumerate()
            .map(|(i, f)| format!("[{}] ({}) {}: {}", i + 1, f.item.facet_type.as_str(), f.item.id, f.item.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub id: String,
    pub facet_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub score: f64,
    pub sources: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub generation_time_ms: u64,
    pub rag_source_count: usize,
    #[serde(default)]
    pub agents_from_cache: Vec<AgentKind>,
}

/// Merged artifact of one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design: Option<DesignOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation: Option<InstallationOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<RiskAssessmentOutput>,
    #[serde(default)]
    pub sources: Vec<SourceCitation>,
    pub metadata: ResultMetadata,
}

impl JobResult {
    pub fn assemble(
        outputs: BTreeMap<AgentKind, AgentOutput>,
        context: &RetrievedContext,
        metadata: ResultMetadata,
    ) -> Self {
        let mut result = JobResult {
            sources: context.citations(),
            metadata,
            ..Default::default()
        };
        for output in outputs.into_values() {
            match output {
                AgentOutput::Design(d) => result.design = Some(d),
                AgentOutput::Installation(i) => result.installation = Some(i),
                AgentOutput::RiskAssessment(r) => result.risk_assessment = Some(r),
            }
        }
        result
    }

    pub fn has_section(&self, kind: AgentKind) -> bool {
        match kind {
            AgentKind::Designer => self.design.is_some(),
            AgentKind::Installer => self.installation.is_some(),
            AgentKind::HealthSafety => self.risk_assessment.is_some(),
        }
    }
}

/// Progress sink handed to an agent for one job.
///
/// `report` returns unit: persistence failures are handled inside the sink
/// and can never fail the agent.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, percent: u8, message: &str);

    /// True once the job has been observed as cancelled.
    fn is_cancelled(&self) -> bool;
}

/// Sink that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

#[async_trait]
impl ProgressReporter for NoopProgress {
    async fn report(&self, _percent: u8, _message: &str) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

#[async_trait]
pub trait AgentCore: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Implementation name for logs, e.g. "llm-designer"
    fn name(&self) -> &str;

    async fn run(
        &self,
        inputs: &JobInputs,
        progress: &dyn ProgressReporter,
        context: &RetrievedContext,
    ) -> Result<AgentOutput, OrchestrationError>;
}
