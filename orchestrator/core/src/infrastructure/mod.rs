// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod repositories;
pub mod db;
pub mod event_bus;
pub mod llm;
pub mod prompt_template_engine;

pub use event_bus::EventBus;
pub use prompt_template_engine::PromptTemplateEngine;
