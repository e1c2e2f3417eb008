// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! End-to-end job processing against in-memory storage and mock agents.

mod common;

use common::*;
use sparkplan_core::application::agents::TemplateInstallerAgent;
use sparkplan_core::domain::cache::CacheNamespace;
use sparkplan_core::domain::circuit_breaker::{BreakerState, COMPLETION_BREAKER};
use sparkplan_core::domain::clock::{Clock, ManualClock};
use sparkplan_core::domain::error::ErrorKind;
use sparkplan_core::domain::events::JobEvent;
use sparkplan_core::domain::job::{AgentKind, AgentStatus, JobStatus};
use sparkplan_core::domain::repository::JobRepository;
use sparkplan_core::domain::split;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[tokio::test]
async fn test_equivalent_inputs_share_full_result_cache() {
    let harness = Harness::new();
    let designer = MockAgent::new(AgentKind::Designer, Behaviour::Succeed);
    let orchestrator = harness.builder(vec![registration(&designer)]).build();

    let first = orchestrator
        .submit(inputs(vec![circuit("Kitchen", 31.0)], vec![AgentKind::Designer]))
        .await
        .unwrap();
    let response = orchestrator.process(first).await.unwrap();
    assert!(response.success);
    assert!(!response.cached);

    // 31 m and 32 m land in the same 5 m bucket
    let second = orchestrator
        .submit(inputs(vec![circuit("Kitchen", 32.0)], vec![AgentKind::Designer]))
        .await
        .unwrap();
    let response = orchestrator.process(second).await.unwrap();
    assert!(response.success);
    assert!(response.cached);
    assert_eq!(designer.calls(), 1);

    let job = orchestrator.get(second).await.unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.progress, 100);
    assert_eq!(job.agents[&AgentKind::Designer].status, AgentStatus::Cached);
    assert!(job.result.unwrap().design.is_some());
}

#[tokio::test]
async fn test_different_bucket_misses_full_result_cache() {
    let harness = Harness::new();
    let designer = MockAgent::new(AgentKind::Designer, Behaviour::Succeed);
    let orchestrator = harness.builder(vec![registration(&designer)]).build();

    for length in [30.0, 40.0] {
        let id = orchestrator
            .submit(inputs(vec![circuit("Kitchen", length)], vec![AgentKind::Designer]))
            .await
            .unwrap();
        assert!(!orchestrator.process(id).await.unwrap().cached);
    }
    assert_eq!(designer.calls(), 2);
}

#[tokio::test]
async fn test_partial_cache_reused_across_agent_sets() {
    let harness = Harness::new();
    let designer = MockAgent::new(AgentKind::Designer, Behaviour::Succeed);
    let installer = MockAgent::new(AgentKind::Installer, Behaviour::Succeed);
    let orchestrator = harness
        .builder(vec![registration(&designer), registration(&installer)])
        .build();

    let circuits = vec![circuit("Lights", 18.0), circuit("Sockets", 25.0)];
    let first = orchestrator
        .submit(inputs(circuits.clone(), vec![AgentKind::Designer]))
        .await
        .unwrap();
    orchestrator.process(first).await.unwrap();

    let second = orchestrator
        .submit(inputs(circuits, vec![AgentKind::Installer, AgentKind::Designer]))
        .await
        .unwrap();
    let response = orchestrator.process(second).await.unwrap();
    assert!(response.success);
    assert!(!response.cached);
    assert_eq!(designer.calls(), 1);
    assert_eq!(installer.calls(), 1);

    let result = orchestrator.get(second).await.unwrap().result.unwrap();
    assert_eq!(result.metadata.agents_from_cache, vec![AgentKind::Designer]);
    assert!(result.installation.is_some());
    assert!(!result.sources.is_empty());
}

#[tokio::test]
async fn test_breaker_opens_after_threshold_and_skips_work() {
    let harness = Harness::new();
    let designer = MockAgent::new(AgentKind::Designer, Behaviour::Fail(ErrorKind::UpstreamUnavailable));
    let orchestrator = harness.builder(vec![registration(&designer)]).build();

    for i in 0..5 {
        let id = orchestrator
            .submit(inputs(vec![circuit(&format!("C{}", i), 20.0)], vec![AgentKind::Designer]))
            .await
            .unwrap();
        let response = orchestrator.process(id).await.unwrap();
        assert!(!response.success);
    }
    let breaker = orchestrator.breakers().get(COMPLETION_BREAKER);
    assert_eq!(breaker.state(), BreakerState::Open);

    let id = orchestrator
        .submit(inputs(vec![circuit("C5", 20.0)], vec![AgentKind::Designer]))
        .await
        .unwrap();
    let response = orchestrator.process(id).await.unwrap();
    assert!(!response.success);
    assert!(response.error.unwrap().contains("breaker"));
    assert_eq!(designer.calls(), 5);
    assert_eq!(orchestrator.get(id).await.unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn test_validation_failures_do_not_trip_breaker() {
    let harness = Harness::new();
    let designer = MockAgent::new(AgentKind::Designer, Behaviour::Fail(ErrorKind::Validation));
    let orchestrator = harness.builder(vec![registration(&designer)]).build();

    for i in 0..7 {
        let id = orchestrator
            .submit(inputs(vec![circuit(&format!("C{}", i), 20.0)], vec![AgentKind::Designer]))
            .await
            .unwrap();
        orchestrator.process(id).await.unwrap();
    }
    assert_eq!(designer.calls(), 7);
    assert_eq!(
        orchestrator.breakers().get(COMPLETION_BREAKER).state(),
        BreakerState::Closed
    );
}

#[tokio::test]
async fn test_timeout_splits_circuits_and_merges() {
    let harness = Harness::new();
    let designer = MockAgent::new(
        AgentKind::Designer,
        Behaviour::SlowAbove {
            circuits: 6,
            delay: Duration::from_secs(5),
        },
    );
    let orchestrator = harness
        .builder(vec![registration(&designer).with_split(split::by_circuits(5, 2))])
        .with_agent_timeout(Duration::from_millis(100))
        .build();
    let mut events = orchestrator.events().subscribe();

    let id = orchestrator
        .submit(inputs(numbered_circuits(12), vec![AgentKind::Designer]))
        .await
        .unwrap();
    let response = orchestrator.process(id).await.unwrap();
    assert!(response.success, "{:?}", response.error);

    let design = orchestrator.get(id).await.unwrap().result.unwrap().design.unwrap();
    assert_eq!(design.circuits.len(), 12);
    assert_eq!(design.circuits[0].name, "Circuit 1");
    assert_eq!(design.circuits[11].name, "Circuit 12");

    let mut counts = designer.circuit_counts();
    counts.sort_unstable();
    assert_eq!(counts, vec![6, 6, 12]);

    let mut split_seen = false;
    while let Ok(event) = events.try_recv() {
        if let JobEvent::AgentSplit {
            first_half,
            second_half,
            depth,
            ..
        } = event
        {
            assert_eq!((first_half, second_half, depth), (6, 6, 1));
            split_seen = true;
        }
    }
    assert!(split_seen);
}

#[tokio::test]
async fn test_timeout_without_split_fails_job() {
    let harness = Harness::new();
    let designer = MockAgent::new(
        AgentKind::Designer,
        Behaviour::SlowAbove {
            circuits: 0,
            delay: Duration::from_secs(5),
        },
    );
    let orchestrator = harness
        .builder(vec![registration(&designer)])
        .with_agent_timeout(Duration::from_millis(50))
        .build();

    let id = orchestrator
        .submit(inputs(numbered_circuits(2), vec![AgentKind::Designer]))
        .await
        .unwrap();
    let response = orchestrator.process(id).await.unwrap();
    assert!(!response.success);
    assert!(response.error.unwrap().contains("timeout"));
}

#[tokio::test]
async fn test_cancel_mid_flight_wins() {
    let harness = Harness::new();
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let designer = MockAgent::new(
        AgentKind::Designer,
        Behaviour::Gate {
            started: started.clone(),
            release: release.clone(),
        },
    );
    let orchestrator = harness.builder(vec![registration(&designer)]).build();

    let id = orchestrator
        .submit(inputs(numbered_circuits(3), vec![AgentKind::Designer]))
        .await
        .unwrap();

    let (response, cancelled) = tokio::join!(orchestrator.process(id), async {
        started.notified().await;
        let cancelled = orchestrator.cancel(id).await.unwrap();
        release.notify_one();
        cancelled
    });
    assert!(cancelled);
    let response = response.unwrap();
    assert!(response.cancelled);
    assert!(!response.success);

    let job = orchestrator.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.result.is_none());
    assert_eq!(harness.cache.len(CacheNamespace::FullResult), 0);

    // Re-processing a cancelled job is a no-op
    let again = orchestrator.process(id).await.unwrap();
    assert!(again.cancelled);
    assert_eq!(designer.calls(), 1);
}

#[tokio::test]
async fn test_second_process_call_reports_in_progress() {
    let harness = Harness::new();
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let designer = MockAgent::new(
        AgentKind::Designer,
        Behaviour::Gate {
            started: started.clone(),
            release: release.clone(),
        },
    );
    let orchestrator = harness.builder(vec![registration(&designer)]).build();

    let id = orchestrator
        .submit(inputs(numbered_circuits(3), vec![AgentKind::Designer]))
        .await
        .unwrap();

    let (first, second) = tokio::join!(orchestrator.process(id), async {
        started.notified().await;
        let second = orchestrator.process(id).await;
        release.notify_one();
        second
    });
    let first = first.unwrap();
    let second = second.unwrap();
    assert!(first.success, "{:?}", first.error);
    assert!(second.in_progress);
    assert!(!second.success);
    assert!(second.error.is_none());
    assert_eq!(designer.calls(), 1);
    assert_eq!(orchestrator.get(id).await.unwrap().status, JobStatus::Complete);
}

#[tokio::test]
async fn test_concurrent_process_calls_run_agents_once() {
    let harness = Harness::new();
    let designer = MockAgent::new(AgentKind::Designer, Behaviour::Succeed);
    let orchestrator = harness.builder(vec![registration(&designer)]).build();

    let id = orchestrator
        .submit(inputs(numbered_circuits(2), vec![AgentKind::Designer]))
        .await
        .unwrap();
    let (a, b) = tokio::join!(orchestrator.process(id), orchestrator.process(id));
    let (a, b) = (a.unwrap(), b.unwrap());

    // Whichever call lost the race saw the job either in flight or complete
    assert!(a.success || a.in_progress);
    assert!(b.success || b.in_progress);
    assert!(a.success || b.success);
    assert_eq!(designer.calls(), 1);
}

#[tokio::test]
async fn test_stale_processing_job_is_resumed() {
    let harness = Harness::new();
    let clock = Arc::new(ManualClock::default());
    let designer = MockAgent::new(AgentKind::Designer, Behaviour::Succeed);
    let orchestrator = harness
        .builder(vec![registration(&designer)])
        .with_clock(clock.clone())
        .with_stale_after(Duration::from_secs(600))
        .build();

    let id = orchestrator
        .submit(inputs(numbered_circuits(2), vec![AgentKind::Designer]))
        .await
        .unwrap();
    // A run that marked the job processing and then died
    let mut job = orchestrator.get(id).await.unwrap();
    job.start(clock.now()).unwrap();
    harness.jobs.save(&job).await.unwrap();

    clock.advance(chrono::Duration::minutes(9));
    let response = orchestrator.process(id).await.unwrap();
    assert!(response.in_progress);
    assert_eq!(designer.calls(), 0);

    clock.advance(chrono::Duration::minutes(2));
    let response = orchestrator.process(id).await.unwrap();
    assert!(response.success, "{:?}", response.error);
    assert_eq!(designer.calls(), 1);
}

#[tokio::test]
async fn test_heartbeat_keeps_long_run_from_going_stale() {
    let harness = Harness::new();
    let clock = Arc::new(ManualClock::default());
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let designer = MockAgent::new(
        AgentKind::Designer,
        Behaviour::Gate {
            started: started.clone(),
            release: release.clone(),
        },
    );
    let orchestrator = harness
        .builder(vec![registration(&designer)])
        .with_clock(clock.clone())
        .with_stale_after(Duration::from_millis(90))
        .build();

    let id = orchestrator
        .submit(inputs(numbered_circuits(2), vec![AgentKind::Designer]))
        .await
        .unwrap();

    let (first, second) = tokio::join!(orchestrator.process(id), async {
        started.notified().await;
        // Long past the threshold by the job clock; only heartbeats keep it fresh
        clock.advance(chrono::Duration::minutes(1));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = orchestrator.process(id).await;
        release.notify_one();
        second
    });
    assert!(first.unwrap().success);
    assert!(second.unwrap().in_progress);
    assert_eq!(designer.calls(), 1);
}

#[tokio::test]
async fn test_cancel_before_processing() {
    let harness = Harness::new();
    let designer = MockAgent::new(AgentKind::Designer, Behaviour::Succeed);
    let orchestrator = harness.builder(vec![registration(&designer)]).build();

    let id = orchestrator
        .submit(inputs(numbered_circuits(1), vec![AgentKind::Designer]))
        .await
        .unwrap();
    assert!(orchestrator.cancel(id).await.unwrap());
    assert!(!orchestrator.cancel(id).await.unwrap());

    let response = orchestrator.process(id).await.unwrap();
    assert!(response.cancelled);
    assert_eq!(designer.calls(), 0);
}

#[tokio::test]
async fn test_one_agent_failure_fails_job_but_keeps_partial() {
    let harness = Harness::new();
    let designer = MockAgent::new(AgentKind::Designer, Behaviour::Fail(ErrorKind::Validation));
    let health_safety = MockAgent::new(AgentKind::HealthSafety, Behaviour::Succeed);
    let orchestrator = harness
        .builder(vec![registration(&designer), registration(&health_safety)])
        .build();

    let id = orchestrator
        .submit(inputs(
            numbered_circuits(2),
            vec![AgentKind::Designer, AgentKind::HealthSafety],
        ))
        .await
        .unwrap();
    let response = orchestrator.process(id).await.unwrap();
    assert!(!response.success);
    assert!(response.error.unwrap().contains("designer"));

    let job = orchestrator.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.agents[&AgentKind::Designer].status, AgentStatus::Failed);
    assert_eq!(harness.cache.len(CacheNamespace::Partial), 1);
    assert_eq!(harness.cache.len(CacheNamespace::FullResult), 0);
}

#[tokio::test]
async fn test_installer_falls_back_to_template() {
    let harness = Harness::new();
    let installer = MockAgent::new(AgentKind::Installer, Behaviour::Fail(ErrorKind::Validation));
    let orchestrator = harness
        .builder(vec![registration(&installer).with_fallback(Arc::new(TemplateInstallerAgent::new()))])
        .build();
    let mut events = orchestrator.events().subscribe();

    let id = orchestrator
        .submit(inputs(numbered_circuits(2), vec![AgentKind::Installer]))
        .await
        .unwrap();
    let response = orchestrator.process(id).await.unwrap();
    assert!(response.success);

    let installation = orchestrator
        .get(id)
        .await
        .unwrap()
        .result
        .unwrap()
        .installation
        .unwrap();
    // isolation + 2 per circuit + certification
    assert_eq!(installation.steps.len(), 6);
    assert_eq!(installer.calls(), 1);

    let mut fallback = None;
    while let Ok(event) = events.try_recv() {
        if let JobEvent::AgentFallback { fallback: name, .. } = event {
            fallback = Some(name);
        }
    }
    assert_eq!(fallback.as_deref(), Some("template-installer"));
}

#[tokio::test]
async fn test_invalid_inputs_rejected_at_submit() {
    let harness = Harness::new();
    let orchestrator = harness.builder(Vec::new()).build();
    assert!(orchestrator
        .submit(inputs(Vec::new(), vec![AgentKind::Designer]))
        .await
        .is_err());
    assert!(harness.jobs.is_empty());
}
