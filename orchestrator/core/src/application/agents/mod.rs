// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent cores.
//!
//! The three generated cores share [`CompletionStep`]: render the prompt,
//! call the completion provider and parse the JSON answer. The template
//! installer is a deterministic fallback that needs no external service.

pub mod designer;
pub mod health_safety;
pub mod installer;
pub mod template_installer;

pub use designer::DesignerAgent;
pub use health_safety::HealthSafetyAgent;
pub use installer::InstallerAgent;
pub use template_installer::TemplateInstallerAgent;

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::agent::{ProgressReporter, RetrievedContext};
use crate::domain::error::OrchestrationError;
use crate::domain::job::{AgentKind, JobInputs};
use crate::domain::llm::{CompletionProvider, FinishReason, GenerationOptions};
use crate::infrastructure::prompt_template_engine::{PromptContext, PromptTemplateEngine};

/// Parse model output as JSON, tolerating Markdown code fences and prose
/// around a single top-level object.
pub fn parse_json_with_repair<T: DeserializeOwned>(text: &str) -> Result<T, OrchestrationError> {
    let first_err = match serde_json::from_str(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let cleaned = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str(&cleaned) {
        return Ok(value);
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&cleaned[start..=end]) {
                debug!("Recovered JSON object from surrounding text");
                return Ok(value);
            }
        }
    }

    Err(OrchestrationError::validation(format!(
        "completion response is not valid JSON for the expected schema: {}",
        first_err
    )))
}

fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Prompt, generate, parse.
#[derive(Clone)]
pub struct CompletionStep {
    provider: Arc<dyn CompletionProvider>,
    prompts: Arc<PromptTemplateEngine>,
    options: GenerationOptions,
    max_context_facets: usize,
}

impl CompletionStep {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        prompts: Arc<PromptTemplateEngine>,
        options: GenerationOptions,
        max_context_facets: usize,
    ) -> Self {
        Self {
            provider,
            prompts,
            options,
            max_context_facets,
        }
    }

    pub async fn generate<T: DeserializeOwned>(
        &self,
        kind: AgentKind,
        inputs: &JobInputs,
        progress: &dyn ProgressReporter,
        context: &RetrievedContext,
    ) -> Result<T, OrchestrationError> {
        if progress.is_cancelled() {
            return Err(OrchestrationError::cancelled());
        }

        let prompt = self
            .prompts
            .render(kind, &PromptContext::new(inputs, context, self.max_context_facets))?;
        progress
            .report(10, &format!("Prompt prepared for {} circuits", inputs.circuits.len()))
            .await;

        let response = self.provider.generate(&prompt, &self.options).await?;
        debug!(
            "{} completion used {} tokens on {}",
            kind, response.usage.total_tokens, response.model
        );
        match response.finish_reason {
            FinishReason::Stop => {}
            FinishReason::Length => warn!("{} completion hit the token limit; output may be truncated", kind),
            FinishReason::ContentFilter => {
                return Err(OrchestrationError::validation(format!(
                    "{} completion was blocked by the provider's content filter",
                    kind
                )))
            }
        }

        if progress.is_cancelled() {
            return Err(OrchestrationError::cancelled());
        }
        progress.report(80, "Parsing response").await;
        parse_json_with_repair(&response.text)
    }
}
