// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository interfaces for the retrieval bounded context.
//! The knowledge store is read-only: nothing in the workspace writes facets.

use async_trait::async_trait;
use crate::domain::{RetrievalFacet, SearchQuery};

/// Read-only set-overlap query surface over one or more knowledge bases.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Facets of `knowledge_base` whose keyword set intersects the query's,
    /// best first, at most `query.limit` of them.
    async fn search(
        &self,
        knowledge_base: &str,
        query: &SearchQuery,
    ) -> Result<Vec<RetrievalFacet>, RetrievalError>;

    /// Names of the knowledge bases this store can answer for.
    fn knowledge_bases(&self) -> Vec<String>;
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Unknown knowledge base: {0}")]
    UnknownKnowledgeBase(String),

    #[error("Knowledge store unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to load knowledge: {0}")]
    Load(String),
}

impl From<std::io::Error> for RetrievalError {
    fn from(err: std::io::Error) -> Self {
        RetrievalError::Load(err.to_string())
    }
}

impl From<serde_json::Error> for RetrievalError {
    fn from(err: serde_json::Error) -> Self {
        RetrievalError::Load(err.to_string())
    }
}
