// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::warn;

use super::CompletionStep;
use crate::domain::agent::{AgentCore, AgentOutput, DesignOutput, ProgressReporter, RetrievedContext};
use crate::domain::error::OrchestrationError;
use crate::domain::job::{AgentKind, JobInputs};

/// Cable sizing and protective device selection per circuit.
pub struct DesignerAgent {
    step: CompletionStep,
}

impl DesignerAgent {
    pub fn new(step: CompletionStep) -> Self {
        Self { step }
    }
}

/// Every requested circuit must come back exactly once, by name.
fn check_coverage(inputs: &JobInputs, output: &DesignOutput) -> Result<(), OrchestrationError> {
    if output.circuits.is_empty() {
        return Err(OrchestrationError::validation("design contains no circuits"));
    }
    let requested: BTreeSet<&str> = inputs.circuits.iter().map(|c| c.name.as_str()).collect();
    let returned: BTreeSet<&str> = output.circuits.iter().map(|c| c.name.as_str()).collect();
    let missing: Vec<&str> = requested.difference(&returned).copied().collect();
    if !missing.is_empty() {
        return Err(OrchestrationError::validation(format!(
            "design is missing circuits: {}",
            missing.join(", ")
        )));
    }
    let extra = returned.difference(&requested).count();
    if extra > 0 {
        warn!("Design returned {} circuits that were not requested", extra);
    }
    Ok(())
}

#[async_trait]
impl AgentCore for DesignerAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Designer
    }

    fn name(&self) -> &str {
        "llm-designer"
    }

    async fn run(
        &self,
        inputs: &JobInputs,
        progress: &dyn ProgressReporter,
        context: &RetrievedContext,
    ) -> Result<AgentOutput, OrchestrationError> {
        let design: DesignOutput = self.step.generate(self.kind(), inputs, progress, context).await?;
        check_coverage(inputs, &design)?;

        let non_compliant = design.circuits.iter().filter(|c| !c.compliant).count();
        if non_compliant > 0 {
            warn!("{} designed circuits flagged non-compliant", non_compliant);
        }
        progress
            .report(100, &format!("Designed {} circuits", design.circuits.len()))
            .await;
        Ok(AgentOutput::Design(design))
    }
}
