// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cache entry model shared by the three cache layers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    /// L1: full merged job result
    FullResult,
    /// L2: per-knowledge-base retrieval result
    Retrieval,
    /// L3: one agent's output
    Partial,
}

impl CacheNamespace {
    pub const ALL: [CacheNamespace; 3] = [
        CacheNamespace::FullResult,
        CacheNamespace::Retrieval,
        CacheNamespace::Partial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::FullResult => "l1",
            CacheNamespace::Retrieval => "l2",
            CacheNamespace::Partial => "l3",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            CacheNamespace::FullResult => "sparkplan_cache_l1",
            CacheNamespace::Retrieval => "sparkplan_cache_l2",
            CacheNamespace::Partial => "sparkplan_cache_l3",
        }
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: serde_json::Value,
    pub hit_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    /// Fixed at write time; reads never extend it
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, payload: serde_json::Value, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            payload,
            hit_count: 0,
            created_at: now,
            last_used_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Hit {
        data: T,
        age: Duration,
        hit_count: u64,
    },
    Miss,
}

impl<T> CacheLookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit { .. })
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            CacheLookup::Hit { data, .. } => Some(data),
            CacheLookup::Miss => None,
        }
    }
}
