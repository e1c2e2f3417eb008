// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;

use crate::domain::agent::{
    AgentCore, AgentOutput, InstallationOutput, InstallationStep, ProgressReporter, RetrievedContext,
};
use crate::domain::error::OrchestrationError;
use crate::domain::job::{AgentKind, JobInputs};

const TESTING_SEQUENCE: [&str; 6] = [
    "Continuity of protective conductors",
    "Continuity of ring final circuit conductors",
    "Insulation resistance",
    "Polarity",
    "Earth fault loop impedance",
    "RCD operation",
];

/// Deterministic installation method used when the generated one fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateInstallerAgent;

impl TemplateInstallerAgent {
    pub fn new() -> Self {
        Self
    }

    fn plan(inputs: &JobInputs) -> InstallationOutput {
        let mut steps = vec![InstallationStep {
            step: 0,
            title: "Safe isolation".into(),
            description: "Isolate the supply, prove dead with an approved voltage indicator and lock off.".into(),
            circuit: None,
        }];
        for circuit in &inputs.circuits {
            let location = circuit
                .special_location
                .as_deref()
                .map(|l| format!(" Observe the additional requirements for the {} location.", l))
                .unwrap_or_default();
            steps.push(InstallationStep {
                step: 0,
                title: format!("Install cable for {}", circuit.name),
                description: format!(
                    "Route and fix approx. {:.0} m of cable for the {} circuit using safe zones.{}",
                    circuit.cable_length_m,
                    circuit.circuit_type.replace('_', " "),
                    location
                ),
                circuit: Some(circuit.name.clone()),
            });
            steps.push(InstallationStep {
                step: 0,
                title: format!("Terminate {}", circuit.name),
                description: "Terminate at the accessory and the consumer unit, torque to manufacturer values and label the circuit.".into(),
                circuit: Some(circuit.name.clone()),
            });
        }
        steps.push(InstallationStep {
            step: 0,
            title: "Inspect, test and certify".into(),
            description: "Carry out initial verification and issue the certificate.".into(),
            circuit: None,
        });
        for (i, step) in steps.iter_mut().enumerate() {
            step.step = i as u32 + 1;
        }

        let has_ring = inputs.circuits.iter().any(|c| c.circuit_type.contains("ring"));
        InstallationOutput {
            summary: format!(
                "Standard installation sequence for {} circuits at {}.",
                inputs.circuits.len(),
                inputs.project_name
            ),
            steps,
            materials: vec!["Cable to design schedule".into(), "Cable clips and fixings".into(), "Circuit labels".into()],
            tools: vec!["Approved voltage indicator".into(), "Lock-off kit".into(), "Multifunction tester".into()],
            testing: TESTING_SEQUENCE
                .iter()
                .filter(|t| has_ring || !t.contains("ring"))
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

#[async_trait]
impl AgentCore for TemplateInstallerAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Installer
    }

    fn name(&self) -> &str {
        "template-installer"
    }

    async fn run(
        &self,
        inputs: &JobInputs,
        progress: &dyn ProgressReporter,
        _context: &RetrievedContext,
    ) -> Result<AgentOutput, OrchestrationError> {
        if progress.is_cancelled() {
            return Err(OrchestrationError::cancelled());
        }
        let plan = Self::plan(inputs);
        progress.report(100, "Template installation method prepared").await;
        Ok(AgentOutput::Installation(plan))
    }
}
