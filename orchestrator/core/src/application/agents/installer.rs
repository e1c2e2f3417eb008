// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;

use super::CompletionStep;
use crate::domain::agent::{AgentCore, AgentOutput, InstallationOutput, ProgressReporter, RetrievedContext};
use crate::domain::error::OrchestrationError;
use crate::domain::job::{AgentKind, JobInputs};

/// Step-by-step installation method statement.
pub struct InstallerAgent {
    step: CompletionStep,
}

impl InstallerAgent {
    pub fn new(step: CompletionStep) -> Self {
        Self { step }
    }
}

#[async_trait]
impl AgentCore for InstallerAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Installer
    }

    fn name(&self) -> &str {
        "llm-installer"
    }

    async fn run(
        &self,
        inputs: &JobInputs,
        progress: &dyn ProgressReporter,
        context: &RetrievedContext,
    ) -> Result<AgentOutput, OrchestrationError> {
        let mut method: InstallationOutput = self.step.generate(self.kind(), inputs, progress, context).await?;
        if method.steps.is_empty() {
            return Err(OrchestrationError::validation("installation method contains no steps"));
        }
        // Models number inconsistently
        for (i, step) in method.steps.iter_mut().enumerate() {
            step.step = i as u32 + 1;
        }
        progress
            .report(100, &format!("Planned {} installation steps", method.steps.len()))
            .await;
        Ok(AgentOutput::Installation(method))
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

    fn inputs() -> JobInputs {
        JobInputs {
            project_name: "Garage".into(),
            location: String::new(),
            installation_type: "domestic".into(),
            supply_voltage: 230.0,
            earthing_system: "TT".into(),
            circuits: vec![CircuitSpec {
                name: "EV".into(),
                circuit_type: "ev_charger".into(),
                load_power_w: 7400.0,
                cable_length_m: 25.0,
                voltage: 230.0,
                phases: 1,
                special_location: Some("outdoor".into()),
            }],
            additional_prompt: None,
            agents: vec![AgentKind::Installer],
        }
    }

    fn agent(response: &str) -> InstallerAgent {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(response.to_string())]));
        InstallerAgent::new(CompletionStep::new(
            provider,
            Arc::new(PromptTemplateEngine::new()),
            GenerationOptions::default(),
            8,
        ))
    }

    #[tokio::test]
    async fn test_steps_are_renumbered() {
        let agent = agent(r#"{"steps":[{"step":4,"title":"Isolate"},{"step":9,"title":"Fix cable"}],"tools":["SDS drill"]}"#);
        let output = agent
            .run(&inputs(), &NoopProgress, &RetrievedContext::default())
            .await
            .unwrap();
        match output {
            AgentOutput::Installation(method) => {
                assert_eq!(method.steps[0].step, 1);
                assert_eq!(method.steps[1].step, 2);
                assert_eq!(method.tools, vec!["SDS drill".to_string()]);
            }
            other => panic!("unexpected output: {:?}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_empty_method_rejected() {
        let err = agent(r#"{"steps":[]}"#)
            .run(&inputs(), &NoopProgress, &RetrievedContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
