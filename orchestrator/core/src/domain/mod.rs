// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: job model, agent contracts, cache keys and the resilience
//! primitives (circuit breaker, retry, adaptive split).

pub mod clock;
pub mod error;
pub mod llm;
pub mod job;
pub mod cache_key;
pub mod cache;
pub mod agent;
pub mod circuit_breaker;
pub mod retry;
pub mod split;
pub mod repository;
pub mod events;
pub mod config;
