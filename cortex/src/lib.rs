// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Knowledge retrieval for sparkplan: keyword expansion, set-overlap search
//! over pre-tagged facets, and reciprocal rank fusion.
//!
//! # Architecture
//!
//! - **Layer:** Retrieval Layer
//! - **Purpose:** Shared context for every agent in a job

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::*;
pub use infrastructure::*;
