// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Retrieval facets: the atomic, pre-tagged units of reference knowledge.
//!
//! Facets are read-only from the point of view of this workspace. They are
//! authored elsewhere, tagged with keywords ahead of time, and loaded into a
//! [`KnowledgeStore`](crate::infrastructure::KnowledgeStore) at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FacetId(pub String);

impl FacetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FacetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetType {
    Concept,
    Formula,
    Table,
    Example,
    Regulation,
}

impl FacetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacetType::Concept => "concept",
            FacetType::Formula => "formula",
            FacetType::Table => "table",
            FacetType::Example => "example",
            FacetType::Regulation => "regulation",
        }
    }
}

impl fmt::Display for FacetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalFacet {
    pub id: FacetId,

    #[serde(rename = "type")]
    pub facet_type: FacetType,

    /// Free-form grouping used by category filters (e.g. "cable_sizing")
    #[serde(default)]
    pub category: Option<String>,

    /// Lowercase lookup tags; matching is a set intersection against these
    pub keywords: BTreeSet<String>,

    pub content: String,

    /// Editorial quality in 0.0..=1.0
    #[serde(default = "default_score")]
    pub quality_score: f64,

    /// Confidence that the content is current, 0.0..=1.0
    #[serde(default = "default_score")]
    pub confidence_score: f64,
}

fn default_score() -> f64 {
    0.5
}

impl RetrievalFacet {
    pub fn new(
        id: impl Into<String>,
        facet_type: FacetType,
        keywords: impl IntoIterator<Item = impl Into<String>>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: FacetId::new(id),
            facet_type,
            category: None,
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .collect(),
            content: content.into(),
            quality_score: default_score(),
            confidence_score: default_score(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_scores(mut self, quality: f64, confidence: f64) -> Self {
        self.quality_score = quality;
        self.confidence_score = confidence;
        self
    }

    /// Precomputed secondary ranking signal.
    pub fn rank_score(&self) -> f64 {
        self.quality_score.clamp(0.0, 1.0) * self.confidence_score.clamp(0.0, 1.0)
    }

    /// Number of query keywords present in this facet's keyword set.
    pub fn overlap(&self, query: &BTreeSet<String>) -> usize {
        // Iterate the smaller set
        if query.len() < self.keywords.len() {
            query.iter().filter(|k| self.keywords.contains(*k)).count()
        } else {
            self.keywords.iter().filter(|k| query.contains(*k)).count()
        }
    }
}
