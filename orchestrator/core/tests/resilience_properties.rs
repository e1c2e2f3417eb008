// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Property tests for progress aggregation, cache keys, retry and the
//! circuit breaker.

use chrono::Utc;
use proptest::prelude::*;
use sparkplan_core::application::ProgressTracker;
use sparkplan_core::domain::cache_key::CacheKeyer;
use sparkplan_core::domain::circuit_breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use sparkplan_core::domain::clock::ManualClock;
use sparkplan_core::domain::error::{ErrorKind, OrchestrationError};
use sparkplan_core::domain::job::{AgentKind, CircuitSpec, JobInputs};
use sparkplan_core::domain::retry::{retry_transient, with_retry, RetryPolicy};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn agent_kind() -> impl Strategy<Value = AgentKind> {
    prop_oneof![
        Just(AgentKind::Designer),
        Just(AgentKind::Installer),
        Just(AgentKind::HealthSafety),
    ]
}

fn error_kind() -> impl Strategy<Value = ErrorKind> {
    prop_oneof![
        Just(ErrorKind::Timeout),
        Just(ErrorKind::RateLimited),
        Just(ErrorKind::UpstreamUnavailable),
        Just(ErrorKind::Validation),
        Just(ErrorKind::Internal),
    ]
}

fn job(lengths: &[f64]) -> JobInputs {
    JobInputs {
        project_name: "Unit 4".into(),
        location: String::new(),
        installation_type: "commercial".into(),
        supply_voltage: 400.0,
        earthing_system: "TN-S".into(),
        circuits: lengths
            .iter()
            .enumerate()
            .map(|(i, l)| CircuitSpec {
                name: format!("DB1-{}", i),
                circuit_type: "radial".into(),
                load_power_w: 1500.0,
                cable_length_m: *l,
                voltage: 230.0,
                phases: 1,
                special_location: None,
            })
            .collect(),
        additional_prompt: None,
        agents: vec![AgentKind::Designer, AgentKind::Installer],
    }
}

proptest! {
    #[test]
    fn overall_progress_never_decreases(
        weights in proptest::collection::vec(0u32..10, 3),
        updates in proptest::collection::vec((agent_kind(), 0u8..=120), 1..60),
    ) {
        let weights: BTreeMap<AgentKind, u32> = AgentKind::ALL.iter().copied().zip(weights).collect();
        let tracker = ProgressTracker::new(&AgentKind::ALL, &weights);
        let mut last = 0u8;
        for (kind, percent) in updates {
            let overall = tracker.update(kind, percent);
            prop_assert!(overall >= last);
            prop_assert!(overall <= 100);
            last = overall;
        }
    }

    #[test]
    fn all_agents_done_means_overall_done(weights in proptest::collection::vec(0u32..10, 3)) {
        let weights: BTreeMap<AgentKind, u32> = AgentKind::ALL.iter().copied().zip(weights).collect();
        let tracker = ProgressTracker::new(&AgentKind::ALL, &weights);
        for kind in AgentKind::ALL {
            tracker.update(kind, 100);
        }
        prop_assert_eq!(tracker.overall(), 100);
    }

    #[test]
    fn circuit_order_does_not_change_keys(lengths in proptest::collection::vec(1.0f64..200.0, 1..8)) {
        let mut lengths = lengths;
        let keyer = CacheKeyer::new("secret");
        let forward = job(&lengths);
        let mut reversed = forward.clone();
        reversed.circuits.reverse();
        prop_assert_eq!(keyer.full_result(&forward), keyer.full_result(&reversed));
        prop_assert_eq!(
            keyer.partial(&forward, AgentKind::Designer),
            keyer.partial(&reversed, AgentKind::Designer)
        );

        lengths[0] += 50.0;
        prop_assert_ne!(keyer.full_result(&forward), keyer.full_result(&job(&lengths)));
    }

    #[test]
    fn breaker_opens_exactly_at_threshold(threshold in 1u32..8, failures in 0u32..12) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let breaker = CircuitBreaker::new(
            "completion",
            BreakerConfig { threshold, reset_timeout: Duration::from_secs(60) },
            clock,
        );
        for _ in 0..failures {
            breaker.record_failure();
        }
        let expected = if failures >= threshold { BreakerState::Open } else { BreakerState::Closed };
        prop_assert_eq!(breaker.state(), expected);
        prop_assert_eq!(breaker.acquire().is_err(), failures >= threshold);
    }

    #[test]
    fn retry_attempts_match_classification(max_attempts in 1u32..5, kind in error_kind()) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(max_attempts, Duration::from_millis(1), 2.0);
        let result: Result<(), OrchestrationError> = rt.block_on(with_retry(&policy, retry_transient, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(OrchestrationError::new(kind, "boom")) }
        }));

        prop_assert_eq!(result.unwrap_err().kind, kind);
        let expected = if kind.is_retryable() { max_attempts } else { 1 };
        prop_assert_eq!(calls.load(Ordering::SeqCst), expected);
    }
}

#[test]
fn breaker_half_open_admits_one_trial() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let breaker = CircuitBreaker::new(
        "knowledge_store",
        BreakerConfig {
            threshold: 2,
            reset_timeout: Duration::from_secs(30),
        },
        clock.clone(),
    );
    breaker.record_failure();
    breaker.record_failure();
    assert!(breaker.acquire().is_err());

    clock.advance(chrono::Duration::seconds(31));
    assert!(breaker.acquire().is_ok());
    assert!(breaker.acquire().is_err());

    breaker.record_success();
    assert_eq!(breaker.state(), BreakerState::Closed);
    assert!(breaker.acquire().is_ok());
}
