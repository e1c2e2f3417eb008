// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer for the retrieval bounded context

pub mod repository;
pub mod memory_index;

pub use repository::{KnowledgeStore, RetrievalError};
pub use memory_index::InMemoryKnowledgeStore;
