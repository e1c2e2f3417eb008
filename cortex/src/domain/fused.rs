// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::facet::RetrievalFacet;

/// One entry of a fused ranking, with the sources that contributed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult<T> {
    pub item: T,
    pub score: f64,
    pub sources: BTreeSet<String>,
}

/// How an item is deduplicated across ranked lists.
///
/// Resolution order is explicit id, then natural key, then a positional
/// fallback assigned by the fuser (`source#rank`).
pub trait FusionIdentity {
    fn fusion_id(&self) -> Option<String>;

    fn natural_key(&self) -> Option<String> {
        None
    }
}

impl FusionIdentity for RetrievalFacet {
    fn fusion_id(&self) -> Option<String> {
        Some(self.id.0.clone())
    }
}

/// Loosely-typed rows from external sources, e.g. regulation records that
/// carry `regulation_number` instead of an `id`.
impl FusionIdentity for serde_json::Value {
    fn fusion_id(&self) -> Option<String> {
        match self.get("id")? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn natural_key(&self) -> Option<String> {
        ["regulation_number", "title", "name"]
            .iter()
            .find_map(|field| self.get(*field).and_then(|v| v.as_str()))
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
    }
}
