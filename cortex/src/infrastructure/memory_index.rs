// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # In-Memory Knowledge Index
//!
//! Inverted keyword index over a closed, pre-enumerated set of facets.
//! Search is a set-overlap predicate (a facet is a candidate iff it shares at
//! least one keyword with the query) ranked by:
//!
//! 1. overlap count, descending
//! 2. `quality_score × confidence_score`, descending
//! 3. facet id, ascending (stable tie-break)
//!
//! The knowledge file is JSON:
//!
//! ```json
//! { "knowledge_bases": { "regulations": [ { "id": "...", "type": "regulation", ... } ] } }
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

use crate::domain::{RetrievalFacet, SearchQuery};
use super::repository::{KnowledgeStore, RetrievalError};

#[derive(Debug, Deserialize)]
struct KnowledgeFile {
    knowledge_bases: HashMap<String, Vec<RetrievalFacet>>,
}

#[derive(Debug, Default)]
struct BaseIndex {
    facets: Vec<RetrievalFacet>,
    by_keyword: HashMap<String, Vec<usize>>,
}

impl BaseIndex {
    fn build(facets: Vec<RetrievalFacet>) -> Self {
        let mut by_keyword: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, facet) in facets.iter().enumerate() {
            for keyword in &facet.keywords {
                by_keyword.entry(keyword.clone()).or_default().push(idx);
            }
        }
        Self { facets, by_keyword }
    }

    fn search(&self, query: &SearchQuery) -> Vec<RetrievalFacet> {
        let mut overlap: HashMap<usize, usize> = HashMap::new();
        for keyword in &query.keywords {
            if let Some(postings) = self.by_keyword.get(keyword) {
                for idx in postings {
                    *overlap.entry(*idx).or_default() += 1;
                }
            }
        }

        let mut candidates: Vec<(usize, usize)> = overlap
            .into_iter()
            .filter(|(idx, _)| query.admits(&self.facets[*idx]))
            .collect();

        candidates.sort_by(|(ia, oa), (ib, ob)| {
            let a = &self.facets[*ia];
            let b = &self.facets[*ib];
            ob.cmp(oa)
                .then_with(|| {
                    b.rank_score()
                        .partial_cmp(&a.rank_score())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.id.cmp(&b.id))
        });

        candidates
            .into_iter()
            .take(query.limit)
            .map(|(idx, _)| self.facets[idx].clone())
            .collect()
    }
}

/// Thread-safe by construction: the index is immutable after load.
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeStore {
    bases: HashMap<String, BaseIndex>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(mut self, name: impl Into<String>, facets: Vec<RetrievalFacet>) -> Self {
        self.insert_base(name, facets);
        self
    }

    pub fn insert_base(&mut self, name: impl Into<String>, facets: Vec<RetrievalFacet>) {
        let name = name.into();
        debug!("Indexing knowledge base '{}' ({} facets)", name, facets.len());
        self.bases.insert(name, BaseIndex::build(facets));
    }

    pub fn from_json_str(json: &str) -> Result<Self, RetrievalError> {
        let file: KnowledgeFile = serde_json::from_str(json)?;
        let mut store = Self::new();
        for (name, facets) in file.knowledge_bases {
            store.insert_base(name, facets);
        }
        Ok(store)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RetrievalError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let store = Self::from_json_str(&content)?;
        info!(
            "Loaded {} knowledge bases ({} facets) from {:?}",
            store.bases.len(),
            store.facet_count(),
            path
        );
        Ok(store)
    }

    pub fn facet_count(&self) -> usize {
        self.bases.values().map(|b| b.facets.len()).sum()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn search(
        &self,
        knowledge_base: &str,
        query: &SearchQuery,
    ) -> Result<Vec<RetrievalFacet>, RetrievalError> {
        let base = self
            .bases
            .get(knowledge_base)
            .ok_or_else(|| RetrievalError::UnknownKnowledgeBase(knowledge_base.to_string()))?;
        Ok(base.search(query))
    }

    fn knowledge_bases(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self.bases.keys().collect();
        names.into_iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FacetType;
    use std::io::Write;

    fn store() -> InMemoryKnowledgeStore {
        InMemoryKnowledgeStore::new().with_base(
            "regulations",
            vec![
                RetrievalFacet::new("411.3.3", FacetType::Regulation, ["rcd", "socket", "additional"], "30mA RCD for sockets")
                    .with_category("protection")
                    .with_scores(0.9, 0.9),
                RetrievalFacet::new("701.411", FacetType::Regulation, ["rcd", "bathroom", "shower"], "Bathroom RCD")
                    .with_category("special_locations")
                    .with_scores(0.8, 0.8),
                RetrievalFacet::new("525", FacetType::Table, ["voltage", "drop"], "Voltage drop limits")
                    .with_scores(1.0, 1.0),
                RetrievalFacet::new("low-q", FacetType::Example, ["rcd"], "Weak example")
                    .with_scores(0.1, 0.1),
            ],
        )
    }

    #[tokio::test]
    async fn test_overlap_ranks_first() {
        let query = SearchQuery::new(["rcd", "bathroom", "shower"]);
        let results = store().search("regulations", &query).await.unwrap();
        assert_eq!(results[0].id.0, "701.411");
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_quality_breaks_overlap_ties() {
        let query = SearchQuery::new(["rcd"]);
        let results = store().search("regulations", &query).await.unwrap();
        let ids: Vec<_> = results.iter().map(|f| f.id.0.as_str()).collect();
        assert_eq!(ids, vec!["411.3.3", "701.411", "low-q"]);
    }

    #[tokio::test]
    async fn test_no_overlap_no_results() {
        let query = SearchQuery::new(["solar"]);
        assert!(store().search("regulations", &query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filters_and_limit() {
        let query = SearchQuery::new(["rcd"])
            .with_types([FacetType::Regulation])
            .with_limit(1);
        let results = store().search("regulations", &query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id.0, "411.3.3");

        let by_category = SearchQuery::new(["rcd"]).with_categories(["special_locations"]);
        let results = store().search("regulations", &by_category).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id.0, "701.411");
    }

    #[tokio::test]
    async fn test_unknown_base_is_an_error() {
        let query = SearchQuery::new(["rcd"]);
        let err = store().search("nope", &query).await.unwrap_err();
        assert!(matches!(err, RetrievalError::UnknownKnowledgeBase(_)));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"knowledge_bases": {{"guidance": [
                {{"id": "g1", "type": "example", "keywords": ["cable"], "content": "Clip every 300mm"}}
            ]}}}}"#
        )
        .unwrap();

        let store = InMemoryKnowledgeStore::from_json_file(file.path()).unwrap();
        assert_eq!(store.knowledge_bases(), vec!["guidance".to_string()]);
        let results = store.search("guidance", &SearchQuery::new(["cable"])).await.unwrap();
        assert_eq!(results[0].quality_score, 0.5);
    }
}
