// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Cache Layers
//!
//! Typed views over the three [`CacheNamespace`]s of one [`CacheStore`].
//!
//! | Layer | Payload | Key | Default TTL |
//! |-------|---------|-----|-------------|
//! | L1 | `JobResult` | hash of normalized inputs | 30 days |
//! | L2 | `Vec<RetrievalFacet>` | `knowledge_base::query` | 7 days |
//! | L3 | `AgentOutput` | hash of inputs + agent | 30 days |
//!
//! `check` treats read errors, expired rows and payloads that no longer decode
//! as misses. `store` logs failures and returns unit.

use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sparkplan_cortex::RetrievalFacet;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::agent::{AgentOutput, JobResult};
use crate::domain::cache::{CacheEntry, CacheLookup, CacheNamespace};
use crate::domain::clock::{to_chrono, Clock};
use crate::domain::config::CacheConfig;
use crate::domain::job::AgentKind;
use crate::domain::repository::CacheStore;

/// One typed cache layer.
pub struct CacheLayer<T> {
    namespace: CacheNamespace,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for CacheLayer<T> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace,
            store: self.store.clone(),
            clock: self.clock.clone(),
            ttl: self.ttl,
            _payload: PhantomData,
        }
    }
}

impl<T> CacheLayer<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(
        namespace: CacheNamespace,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        ttl: std::time::Duration,
    ) -> Self {
        Self {
            namespace,
            store,
            clock,
            ttl: to_chrono(ttl),
            _payload: PhantomData,
        }
    }

    pub fn namespace(&self) -> CacheNamespace {
        self.namespace
    }

    pub async fn check(&self, key: &str) -> CacheLookup<T> {
        self.check_where(key, |_| true).await
    }

    /// Lookup that additionally rejects decoded payloads failing `accept`.
    pub async fn check_where(&self, key: &str, accept: impl Fn(&T) -> bool) -> CacheLookup<T> {
        let now = self.clock.now();
        let entry = match self.store.get(self.namespace, key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return self.miss(key, "absent"),
            Err(e) => {
                warn!("Cache {} read failed, treating as miss: {}", self.namespace, e);
                return self.miss(key, "read error");
            }
        };

        if entry.is_expired(now) {
            return self.miss(key, "expired");
        }

        let data: T = match serde_json::from_value(entry.payload) {
            Ok(data) => data,
            Err(e) => {
                warn!("Cache {} payload for {} failed to decode: {}", self.namespace, key, e);
                return self.miss(key, "malformed");
            }
        };
        if !accept(&data) {
            return self.miss(key, "rejected");
        }

        let hit_count = match self.store.record_hit(self.namespace, key, now).await {
            Ok(Some(updated)) => updated.hit_count,
            Ok(None) => entry.hit_count + 1,
            Err(e) => {
                warn!("Cache {} hit bookkeeping failed: {}", self.namespace, e);
                entry.hit_count + 1
            }
        };

        metrics::counter!("sparkplan_cache_hits_total", "layer" => self.namespace.as_str()).increment(1);
        debug!("Cache {} hit for {} (hit #{})", self.namespace, key, hit_count);
        CacheLookup::Hit {
            data,
            age: now - entry.created_at,
            hit_count,
        }
    }

    fn miss(&self, key: &str, reason: &'static str) -> CacheLookup<T> {
        metrics::counter!("sparkplan_cache_misses_total", "layer" => self.namespace.as_str()).increment(1);
        debug!("Cache {} miss for {} ({})", self.namespace, key, reason);
        CacheLookup::Miss
    }

    pub async fn store(&self, key: &str, payload: &T) {
        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("Cache {} payload for {} could not be encoded: {}", self.namespace, key, e);
                return;
            }
        };
        let entry = CacheEntry::new(key, value, self.clock.now(), self.ttl);
        if let Err(e) = self.store.put(self.namespace, entry).await {
            warn!("Cache {} write for {} failed: {}", self.namespace, key, e);
        }
    }

    /// Delete expired rows. Returns how many were removed, 0 on failure.
    pub async fn purge_expired(&self) -> u64 {
        match self.store.purge_expired(self.namespace, self.clock.now()).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Cache {} purge failed: {}", self.namespace, e);
                0
            }
        }
    }
}

/// The three layers over one store.
#[derive(Clone)]
pub struct CacheLayers {
    pub full_result: CacheLayer<JobResult>,
    pub retrieval: CacheLayer<Vec<RetrievalFacet>>,
    pub partial: CacheLayer<AgentOutput>,
}

impl CacheLayers {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, config: &CacheConfig) -> Self {
        Self {
            full_result: CacheLayer::new(
                CacheNamespace::FullResult,
                store.clone(),
                clock.clone(),
                config.full_result_ttl,
            ),
            retrieval: CacheLayer::new(
                CacheNamespace::Retrieval,
                store.clone(),
                clock.clone(),
                config.retrieval_ttl,
            ),
            partial: CacheLayer::new(CacheNamespace::Partial, store, clock, config.partial_ttl),
        }
    }

    /// L3 lookup that only accepts the variant belonging to `kind`.
    pub async fn check_partial(&self, key: &str, kind: AgentKind) -> CacheLookup<AgentOutput> {
        self.partial.check_where(key, |output| output.kind() == kind).await
    }

    /// Purge every layer; returns the total number of rows removed.
    pub async fn purge_expired(&self) -> u64 {
        let removed = self.full_result.purge_expired().await
            + self.retrieval.purge_expired().await
            + self.partial.purge_expired().await;
        if removed > 0 {
            info!("Purged {} expired cache entries", removed);
        }
        removed
    }
}
