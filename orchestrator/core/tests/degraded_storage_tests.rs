// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Jobs keep completing when the cache or progress writes are unavailable.

mod common;

use chrono::Utc;
use common::*;
use sparkplan_core::application::CacheLayers;
use sparkplan_core::domain::cache_key::CacheKeyer;
use sparkplan_core::domain::clock::ManualClock;
use sparkplan_core::domain::config::CacheConfig;
use sparkplan_core::domain::job::{AgentKind, JobStatus};
use sparkplan_core::infrastructure::repositories::InMemoryJobRepository;
use std::sync::Arc;

#[tokio::test]
async fn test_unreadable_cache_entries_are_misses() {
    let store = Arc::new(FailingCacheStore::default());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let caches = CacheLayers::new(store.clone(), clock, &CacheConfig::default());
    let keyer = CacheKeyer::new("secret");
    let job = inputs(numbered_circuits(2), vec![AgentKind::Designer]);
    let key = keyer.partial(&job, AgentKind::Designer);

    caches.partial.store(&key, &design_for(&job)).await;
    assert!(!caches.check_partial(&key, AgentKind::Designer).await.is_hit());
    assert!(!caches.full_result.check(&keyer.full_result(&job)).await.is_hit());
    assert_eq!(caches.purge_expired().await, 0);
    assert!(store.calls() >= 3);
}

#[tokio::test]
async fn test_cache_outage_still_completes_job() {
    let jobs = Arc::new(InMemoryJobRepository::new());
    let cache = Arc::new(FailingCacheStore::default());
    let designer = MockAgent::new(AgentKind::Designer, Behaviour::Succeed);
    let installer = MockAgent::new(AgentKind::Installer, Behaviour::Succeed);
    let orchestrator = builder_with(
        jobs,
        cache.clone(),
        vec![registration(&designer), registration(&installer)],
    )
    .build();

    let job_inputs = inputs(numbered_circuits(2), vec![AgentKind::Designer, AgentKind::Installer]);
    let first = orchestrator.submit(job_inputs.clone()).await.unwrap();
    let response = orchestrator.process(first).await.unwrap();
    assert!(response.success, "{:?}", response.error);
    assert!(!response.cached);
    assert_eq!(orchestrator.get(first).await.unwrap().status, JobStatus::Complete);

    // Nothing was stored, so identical inputs run every agent again
    let second = orchestrator.submit(job_inputs).await.unwrap();
    let response = orchestrator.process(second).await.unwrap();
    assert!(response.success);
    assert!(!response.cached);
    assert_eq!(designer.calls(), 2);
    assert_eq!(installer.calls(), 2);
    assert!(cache.calls() > 0);
}

#[tokio::test]
async fn test_lost_progress_writes_do_not_fail_job() {
    let jobs = Arc::new(ProgressLosingRepository::default());
    let designer = MockAgent::new(AgentKind::Designer, Behaviour::Succeed);
    let health_safety = MockAgent::new(AgentKind::HealthSafety, Behaviour::Succeed);
    let orchestrator = builder_with(
        jobs.clone(),
        Harness::new().cache,
        vec![registration(&designer), registration(&health_safety)],
    )
    .build();

    let id = orchestrator
        .submit(inputs(numbered_circuits(3), vec![AgentKind::Designer, AgentKind::HealthSafety]))
        .await
        .unwrap();
    let response = orchestrator.process(id).await.unwrap();
    assert!(response.success, "{:?}", response.error);
    assert!(jobs.rejected() > 0);

    let job = orchestrator.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.progress, 100);
    assert!(job.result.and_then(|r| r.risk_assessment).is_some());
}
