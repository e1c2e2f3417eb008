// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Domain types for the retrieval bounded context.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Facets, queries and fused results

pub mod facet;
pub mod query;
pub mod fused;

pub use facet::*;
pub use query::*;
pub use fused::*;
