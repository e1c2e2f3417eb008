// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Reciprocal Rank Fusion
//!
//! Combines independently ranked lists into one ranking without normalising
//! the sources' native scores:
//!
//! ```text
//! score(item) = Σ over lists containing item of  weight / (K + rank + 1)
//! ```
//!
//! `rank` is zero-based, so the head of a list contributes `weight / (K + 1)`.
//! Items found by several sources accumulate a contribution from each, which
//! rewards cross-source agreement.

use std::collections::{BTreeSet, HashMap};

use crate::domain::{FusedResult, FusionIdentity};

pub const DEFAULT_RRF_K: u32 = 60;

/// One source's ranked output, best first.
#[derive(Debug, Clone)]
pub struct RankedList<T> {
    pub source: String,
    pub weight: f64,
    pub items: Vec<T>,
}

impl<T> RankedList<T> {
    pub fn new(source: impl Into<String>, weight: f64, items: Vec<T>) -> Self {
        Self {
            source: source.into(),
            weight,
            items,
        }
    }
}

struct Accumulator<T> {
    item: T,
    score: f64,
    sources: BTreeSet<String>,
    first_seen: usize,
}

/// Fuse `lists` with smoothing constant `k`, returning at most `limit` results
/// sorted by descending score. Ties keep first-seen order.
pub fn fuse<T>(lists: Vec<RankedList<T>>, k: u32, limit: usize) -> Vec<FusedResult<T>>
where
    T: FusionIdentity,
{
    let mut by_identity: HashMap<String, Accumulator<T>> = HashMap::new();
    let mut seen = 0usize;

    for list in lists {
        let source = list.source;
        let weight = list.weight;
        for (rank, item) in list.items.into_iter().enumerate() {
            let identity = item
                .fusion_id()
                .or_else(|| item.natural_key())
                .unwrap_or_else(|| format!("{}#{}", source, rank));
            let contribution = weight / (k as f64 + rank as f64 + 1.0);

            match by_identity.get_mut(&identity) {
                Some(acc) => {
                    acc.score += contribution;
                    acc.sources.insert(source.clone());
                }
                None => {
                    let mut sources = BTreeSet::new();
                    sources.insert(source.clone());
                    by_identity.insert(
                        identity,
                        Accumulator {
                            item,
                            score: contribution,
                            sources,
                            first_seen: seen,
                        },
                    );
                    seen += 1;
                }
            }
        }
    }

    let mut fused: Vec<Accumulator<T>> = by_identity.into_values().collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.first_seen.cmp(&b.first_seen))
    });
    fused.truncate(limit);

    fused
        .into_iter()
        .map(|acc| FusedResult {
            item: acc.item,
            score: acc.score,
            sources: acc.sources,
        })
        .collect()
}
