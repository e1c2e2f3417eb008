// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod keyword_extractor;
pub mod fusion;
pub mod retriever;

pub use keyword_extractor::{KeywordExtractor, DEFAULT_MAX_KEYWORDS};
pub use fusion::{fuse, RankedList, DEFAULT_RRF_K};
pub use retriever::{KnowledgeSource, RetrievalOutcome, Retriever};
