// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the sparkplan CLI

pub mod config;
pub mod job;
pub mod knowledge;

pub use self::config::ConfigCommand;
pub use self::job::JobCommand;
pub use self::knowledge::KnowledgeCommand;
