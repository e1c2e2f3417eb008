// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::facet::{FacetType, RetrievalFacet};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// A set-overlap query against one knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keywords: BTreeSet<String>,

    /// Empty means "any type"
    #[serde(default)]
    pub type_filters: BTreeSet<FacetType>,

    /// Empty means "any category"
    #[serde(default)]
    pub category_filters: BTreeSet<String>,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

impl SearchQuery {
    pub fn new(keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keywords: keywords.into_iter().map(|k| k.into().to_lowercase()).collect(),
            type_filters: BTreeSet::new(),
            category_filters: BTreeSet::new(),
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = FacetType>) -> Self {
        self.type_filters.extend(types);
        self
    }

    pub fn with_categories(mut self, categories: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.category_filters
            .extend(categories.into_iter().map(|c| c.into().to_lowercase()));
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Filter predicate applied before overlap scoring.
    pub fn admits(&self, facet: &RetrievalFacet) -> bool {
        if !self.type_filters.is_empty() && !self.type_filters.contains(&facet.facet_type) {
            return false;
        }
        if !self.category_filters.is_empty() {
            match &facet.category {
                Some(category) => {
                    if !self.category_filters.contains(&category.to_lowercase()) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }
}
