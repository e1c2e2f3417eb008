// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Retriever
//!
//! Composes the keyword extractor, one or more knowledge bases and RRF into a
//! single retrieval pipeline. This type does no caching and no failure gating;
//! the orchestrator wraps [`Retriever::search_source`] with both and then calls
//! [`Retriever::fuse_sources`] on whatever it collected.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::application::fusion::{fuse, RankedList, DEFAULT_RRF_K};
use crate::application::keyword_extractor::KeywordExtractor;
use crate::domain::{FacetType, FusedResult, RetrievalFacet, SearchQuery, DEFAULT_SEARCH_LIMIT};
use crate::infrastructure::{KnowledgeStore, RetrievalError};

/// One knowledge base participating in fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSource {
    pub knowledge_base: String,

    /// RRF weight for this source's ranking
    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(default = "default_source_limit")]
    pub limit: usize,

    #[serde(default)]
    pub type_filters: BTreeSet<FacetType>,

    #[serde(default)]
    pub category_filters: BTreeSet<String>,
}

fn default_weight() -> f64 {
    1.0
}

fn default_source_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

impl KnowledgeSource {
    pub fn new(knowledge_base: impl Into<String>, weight: f64) -> Self {
        Self {
            knowledge_base: knowledge_base.into(),
            weight,
            limit: DEFAULT_SEARCH_LIMIT,
            type_filters: BTreeSet::new(),
            category_filters: BTreeSet::new(),
        }
    }

    pub fn query(&self, keywords: &[String]) -> SearchQuery {
        SearchQuery::new(keywords.iter().cloned())
            .with_types(self.type_filters.iter().copied())
            .with_categories(self.category_filters.iter().cloned())
            .with_limit(self.limit)
    }
}

/// Output of a full retrieval pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub keywords: Vec<String>,
    pub results: Vec<FusedResult<RetrievalFacet>>,
}

#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn KnowledgeStore>,
    extractor: KeywordExtractor,
    sources: Vec<KnowledgeSource>,
    rrf_k: u32,
    result_limit: usize,
}

impl Retriever {
    pub fn new(store: Arc<dyn KnowledgeStore>, sources: Vec<KnowledgeSource>) -> Self {
        Self {
            store,
            extractor: KeywordExtractor::default(),
            sources,
            rrf_k: DEFAULT_RRF_K,
            result_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    pub fn with_extractor(mut self, extractor: KeywordExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_rrf_k(mut self, k: u32) -> Self {
        self.rrf_k = k;
        self
    }

    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = limit;
        self
    }

    pub fn sources(&self) -> &[KnowledgeSource] {
        &self.sources
    }

    pub fn extractor(&self) -> &KeywordExtractor {
        &self.extractor
    }

    pub fn keywords(&self, text: &str) -> Vec<String> {
        self.extractor.extract(text)
    }

    /// Query one knowledge base.
    pub async fn search_source(
        &self,
        source: &KnowledgeSource,
        keywords: &[String],
    ) -> Result<Vec<RetrievalFacet>, RetrievalError> {
        let query = source.query(keywords);
        let facets = self.store.search(&source.knowledge_base, &query).await?;
        debug!(
            "Knowledge base '{}' returned {} facets",
            source.knowledge_base,
            facets.len()
        );
        Ok(facets)
    }

    /// Fuse per-source rankings, paired with their source definitions.
    pub fn fuse_sources(
        &self,
        per_source: Vec<(KnowledgeSource, Vec<RetrievalFacet>)>,
    ) -> Vec<FusedResult<RetrievalFacet>> {
        let lists = per_source
            .into_iter()
            .map(|(source, facets)| RankedList::new(source.knowledge_base, source.weight, facets))
            .collect();
        fuse(lists, self.rrf_k, self.result_limit)
    }

    /// Uncached end-to-end retrieval; a failing source aborts the pass.
    pub async fn retrieve(&self, text: &str) -> Result<RetrievalOutcome, RetrievalError> {
        let keywords = self.keywords(text);
        let mut per_source = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let facets = self.search_source(source, &keywords).await?;
            per_source.push((source.clone(), facets));
        }
        Ok(RetrievalOutcome {
            results: self.fuse_sources(per_source),
            keywords,
        })
    }
}
