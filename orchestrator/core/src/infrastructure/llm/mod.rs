// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Completion Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Each adapter translates between the domain CompletionProvider interface
// and an external API.

pub mod openai;

pub use openai::OpenAIAdapter;

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::info;

use crate::domain::config::{resolve_secret_ref, CompletionConfig};
use crate::domain::llm::CompletionProvider;

/// Builds the configured completion provider, resolving `env:` API keys.
pub fn create_provider(config: &CompletionConfig) -> Result<Arc<dyn CompletionProvider>> {
    let api_key = config.api_key.as_deref().map(resolve_secret_ref).transpose()?;
    match config.provider_type.as_str() {
        "openai" | "openai-compatible" => {
            if config.provider_type == "openai" && api_key.is_none() {
                bail!("Provider type 'openai' requires an api_key");
            }
            info!("Completion provider: {} ({})", config.model, config.endpoint);
            let adapter = OpenAIAdapter::new(
                config.endpoint.clone(),
                api_key,
                config.model.clone(),
                config.request_timeout,
            )?;
            Ok(Arc::new(adapter))
        }
        other => bail!("Unsupported completion provider type: {}", other),
    }
}
