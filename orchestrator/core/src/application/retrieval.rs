// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shared retrieval step run once per job before any agent starts.
//!
//! Per knowledge base: L2 lookup, then on a miss a search gated by the
//! `knowledge_store` breaker, bounded by a timeout and retried on transient
//! errors. Fresh results are written back to L2. The per-source rankings are
//! fused with RRF into one [`RetrievedContext`].

use futures::future::try_join_all;
use sparkplan_cortex::{KnowledgeSource, RetrievalFacet, Retriever};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::application::cache_layers::CacheLayer;
use crate::domain::agent::RetrievedContext;
use crate::domain::cache::CacheLookup;
use crate::domain::cache_key::CacheKeyer;
use crate::domain::circuit_breaker::{BreakerRegistry, KNOWLEDGE_STORE_BREAKER};
use crate::domain::config::RetrievalConfig;
use crate::domain::error::OrchestrationError;
use crate::domain::retry::{retry_transient, with_retry, with_timeout, RetryPolicy};

/// Retrieval result plus how much of it came from L2.
#[derive(Debug, Clone)]
pub struct RetrievalReport {
    pub context: RetrievedContext,
    /// Number of knowledge bases answered from L2
    pub from_cache: usize,
}

pub struct SharedRetrieval {
    retriever: Retriever,
    cache: CacheLayer<Vec<RetrievalFacet>>,
    keyer: Arc<CacheKeyer>,
    breakers: Arc<BreakerRegistry>,
    retry: RetryPolicy,
    timeout: Duration,
    require_results: bool,
    min_results_warning: usize,
}

impl SharedRetrieval {
    pub fn new(
        retriever: Retriever,
        cache: CacheLayer<Vec<RetrievalFacet>>,
        keyer: Arc<CacheKeyer>,
        breakers: Arc<BreakerRegistry>,
        retry: RetryPolicy,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            retriever,
            cache,
            keyer,
            breakers,
            retry,
            timeout: config.timeout,
            require_results: config.require_results,
            min_results_warning: config.min_results_warning,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub async fn retrieve(&self, query_text: &str) -> Result<RetrievalReport, OrchestrationError> {
        let keywords = self.retriever.keywords(query_text);
        debug!("Extracted {} keywords for retrieval", keywords.len());

        let lookups = self
            .retriever
            .sources()
            .iter()
            .map(|source| self.search_cached(source, query_text, &keywords));
        let per_source = try_join_all(lookups).await?;

        let from_cache = per_source.iter().filter(|(_, _, cached)| *cached).count();
        let results = self.retriever.fuse_sources(
            per_source
                .into_iter()
                .map(|(source, facets, _)| (source, facets))
                .collect(),
        );

        if results.is_empty() {
            error!("Retrieval returned no results for query '{}'", query_text);
            if self.require_results {
                return Err(OrchestrationError::validation(
                    "retrieval returned no reference material for this job",
                ));
            }
        } else if results.len() < self.min_results_warning {
            warn!(
                "Retrieval returned only {} results (expected at least {})",
                results.len(),
                self.min_results_warning
            );
        } else {
            info!(
                "Retrieval fused {} results from {} knowledge bases ({} cached)",
                results.len(),
                self.retriever.sources().len(),
                from_cache
            );
        }

        Ok(RetrievalReport {
            context: RetrievedContext {
                keywords,
                facets: results,
            },
            from_cache,
        })
    }

    async fn search_cached(
        &self,
        source: &KnowledgeSource,
        query_text: &str,
        keywords: &[String],
    ) -> Result<(KnowledgeSource, Vec<RetrievalFacet>, bool), OrchestrationError> {
        let key = self.keyer.retrieval(&source.knowledge_base, query_text);
        if let CacheLookup::Hit { data, .. } = self.cache.check(&key).await {
            return Ok((source.clone(), data, true));
        }

        let breaker = self.breakers.get(KNOWLEDGE_STORE_BREAKER);
        let facets = with_retry(&self.retry, retry_transient, || {
            let breaker = breaker.clone();
            async move {
                breaker
                    .call(|| {
                        with_timeout(self.timeout, async {
                            self.retriever
                                .search_source(source, keywords)
                                .await
                                .map_err(OrchestrationError::from)
                        })
                    })
                    .await
            }
        })
        .await?;

        self.cache.store(&key, &facets).await;
        Ok((source.clone(), facets, false))
    }
}
