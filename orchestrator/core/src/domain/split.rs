// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Adaptive work splitting for batchable agent inputs.
//!
//! When a run over a large input times out, the runner halves the input,
//! runs both halves concurrently and merges the two outputs. The strategy is
//! declarative so any batchable agent can opt in.

use std::fmt;
use std::sync::Arc;

use crate::domain::agent::AgentOutput;
use crate::domain::error::OrchestrationError;
use crate::domain::job::JobInputs;

type Predicate<I> = Arc<dyn Fn(&I) -> bool + Send + Sync>;
type Splitter<I> = Arc<dyn Fn(&I) -> (I, I) + Send + Sync>;
type Merger<O> = Arc<dyn Fn(O, O) -> Result<O, OrchestrationError> + Send + Sync>;

pub struct SplitStrategy<I, O> {
    /// How many times an input may be halved along one branch
    pub max_split_depth: u32,
    pub predicate: Predicate<I>,
    pub split: Splitter<I>,
    pub merge: Merger<O>,
}

impl<I, O> Clone for SplitStrategy<I, O> {
    fn clone(&self) -> Self {
        Self {
            max_split_depth: self.max_split_depth,
            predicate: self.predicate.clone(),
            split: self.split.clone(),
            merge: self.merge.clone(),
        }
    }
}

impl<I, O> fmt::Debug for SplitStrategy<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitStrategy")
            .field("max_split_depth", &self.max_split_depth)
            .finish_non_exhaustive()
    }
}

impl<I, O> SplitStrategy<I, O> {
    pub fn new(
        max_split_depth: u32,
        predicate: impl Fn(&I) -> bool + Send + Sync + 'static,
        split: impl Fn(&I) -> (I, I) + Send + Sync + 'static,
        merge: impl Fn(O, O) -> Result<O, OrchestrationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            max_split_depth,
            predicate: Arc::new(predicate),
            split: Arc::new(split),
            merge: Arc::new(merge),
        }
    }

    /// Whether `input` at recursion `depth` may still be split.
    pub fn applies(&self, input: &I, depth: u32) -> bool {
        depth < self.max_split_depth && (self.predicate)(input)
    }
}

/// Split jobs by circuit list once it exceeds `threshold` circuits.
///
/// The first half takes the extra circuit when the count is odd.
pub fn by_circuits(threshold: usize, max_split_depth: u32) -> SplitStrategy<JobInputs, AgentOutput> {
    SplitStrategy::new(
        max_split_depth,
        move |inputs: &JobInputs| inputs.circuits.len() > threshold,
        |inputs: &JobInputs| {
            let mid = inputs.circuits.len().div_ceil(2);
            let mut first = inputs.clone();
            let mut second = inputs.clone();
            first.circuits = inputs.circuits[..mid].to_vec();
            second.circuits = inputs.circuits[mid..].to_vec();
            (first, second)
        },
        |a: AgentOutput, b: AgentOutput| a.merge(b),
    )
}
