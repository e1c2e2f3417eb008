// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use tracing::info;

use super::CompletionStep;
use crate::domain::agent::{
    AgentCore, AgentOutput, ProgressReporter, RetrievedContext, RiskAssessmentOutput, RiskLevel,
};
use crate::domain::error::OrchestrationError;
use crate::domain::job::{AgentKind, JobInputs};

/// Risk assessment on a 5×5 likelihood/severity matrix.
///
/// Scores and bands are always recomputed locally from the two axes; the
/// model's own arithmetic is discarded.
pub struct HealthSafetyAgent {
    step: CompletionStep,
}

impl HealthSafetyAgent {
    pub fn new(step: CompletionStep) -> Self {
        Self { step }
    }
}

#[async_trait]
impl AgentCore for HealthSafetyAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::HealthSafety
    }

    fn name(&self) -> &str {
        "llm-health-safety"
    }

    async fn run(
        &self,
        inputs: &JobInputs,
        progress: &dyn ProgressReporter,
        context: &RetrievedContext,
    ) -> Result<AgentOutput, OrchestrationError> {
        let mut assessment: RiskAssessmentOutput =
            self.step.generate(self.kind(), inputs, progress, context).await?;
        if assessment.hazards.is_empty() {
            return Err(OrchestrationError::validation("risk assessment lists no hazards"));
        }
        assessment.hazards.iter_mut().for_each(|h| h.rescore());
        assessment
            .hazards
            .sort_by(|a, b| b.risk_score.cmp(&a.risk_score));

        let severe = assessment
            .hazards
            .iter()
            .filter(|h| h.risk_level >= RiskLevel::High)
            .count();
        info!(
            "Risk assessment: {} hazards, {} high or very high",
            assessment.hazards.len(),
            severe
        );
        progress
            .report(100, &format!("Assessed {} hazards", assessment.hazards.len()))
            .await;
        Ok(AgentOutput::RiskAssessment(assessment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::agents::testing::ScriptedProvider;
    use crate::domain::agent::NoopProgress;
    use crate::domain::error::ErrorKind;
    use crate::domain::job::CircuitSpec;
    use crate::domain::llm::GenerationOptions;
    use crate::infrastructure::prompt_template_engine::PromptTemplateEngine;
    use std::sync::Arc;

    fn agent(response: &str) -> HealthSafetyAgent {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(response.to_string())]));
        HealthSafetyAgent::new(CompletionStep::new(
            provider,
            Arc::new(PromptTemplateEngine::new()),
            GenerationOptions::default(),
            8,
        ))
    }

    fn inputs() -> JobInputs {
        JobInputs {
            project_name: "Loft".into(),
            location: String::new(),
            installation_type: "domestic".into(),
            supply_voltage: 230.0,
            earthing_system: "TN-S".into(),
            circuits: vec![CircuitSpec {
                name: "Lights".into(),
                circuit_type: "lighting".into(),
                load_power_w: 300.0,
                cable_length_m: 18.0,
                voltage: 230.0,
                phases: 1,
                special_location: None,
            }],
            additional_prompt: None,
            agents: vec![AgentKind::HealthSafety],
        }
    }

    #[tokio::test]
    async fn test_hazards_rescored_and_sorted() {
        let agent = agent(
            r#"{
            "hazards": [
                {"hazard": "Dust", "likelihood": 2, "severity": 2, "risk_score": 99, "risk_level": "very-high"},
                {"hazard": "Electric shock", "likelihood": 3, "severity": 9}
            ],
            "ppe": ["Insulated gloves"]
        }"#,
        );

        let output = agent
            .run(&inputs(), &NoopProgress, &RetrievedContext::default())
            .await
            .unwrap();
        let AgentOutput::RiskAssessment(assessment) = output else {
            panic!("expected a risk assessment");
        };
        assert_eq!(assessment.hazards[0].hazard, "Electric shock");
        assert_eq!(assessment.hazards[0].severity, 5);
        assert_eq!(assessment.hazards[0].risk_score, 15);
        assert_eq!(assessment.hazards[0].risk_level, RiskLevel::VeryHigh);
        assert_eq!(assessment.hazards[1].risk_score, 4);
        assert_eq!(assessment.hazards[1].risk_level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_empty_hazard_list_is_validation_error() {
        let err = agent(r#"{"hazards": [], "ppe": ["Gloves"]}"#)
            .run(&inputs(), &NoopProgress, &RetrievedContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(!err.is_retryable());
        assert!(err.message.contains("no hazards"));
    }
}
