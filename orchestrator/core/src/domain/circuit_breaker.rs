// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Circuit Breaker
//!
//! Per-dependency failure gate.
//!
//! - **Closed** (`failure_count < threshold`): calls pass.
//! - **Open** (threshold met, cooldown running): calls fail with
//!   [`ErrorKind::BreakerOpen`] and no work is attempted.
//! - **Half-open** (threshold met, cooldown elapsed): the count drops to
//!   `threshold / 2` and exactly one trial call is admitted. Success closes
//!   the breaker; failure reopens it with a fresh cooldown.
//!
//! Each breaker keeps its whole state behind one mutex, so every transition
//! is atomic. Breakers are obtained from a [`BreakerRegistry`] owned by the
//! orchestrator; there is no process-global state.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::clock::{to_chrono, Clock, SystemClock};
use crate::domain::error::OrchestrationError;

pub const KNOWLEDGE_STORE_BREAKER: &str = "knowledge_store";
pub const COMPLETION_BREAKER: &str = "completion";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_threshold")]
    pub threshold: u32,

    #[serde(default = "default_reset_timeout", with = "humantime_serde")]
    pub reset_timeout: Duration,
}

fn default_threshold() -> u32 {
    5
}

fn default_reset_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            reset_timeout: default_reset_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Default)]
struct BreakerInner {
    failure_count: u32,
    last_failure: Option<DateTime<Utc>>,
    half_open: bool,
    trial_in_flight: bool,
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub threshold: u32,
    pub reset_timeout_ms: u64,
}

pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn cooldown_elapsed(&self, inner: &BreakerInner) -> bool {
        match inner.last_failure {
            Some(at) => self.clock.now() - at >= to_chrono(self.config.reset_timeout),
            None => true,
        }
    }

    fn enter_half_open(&self, inner: &mut BreakerInner) {
        inner.failure_count = self.config.threshold / 2;
        inner.half_open = true;
        info!(
            "Circuit breaker '{}' half-open, failure count reduced to {}",
            self.name, inner.failure_count
        );
    }

    /// Whether a call right now would be rejected.
    ///
    /// Observing an elapsed cooldown performs the half-open transition.
    pub fn is_open(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.half_open {
            return inner.trial_in_flight;
        }
        if inner.failure_count < self.config.threshold {
            return false;
        }
        if self.cooldown_elapsed(&inner) {
            self.enter_half_open(&mut inner);
            false
        } else {
            true
        }
    }

    /// Admit one call or fail fast. In half-open state only the first caller
    /// gets through until the trial resolves.
    pub fn acquire(&self) -> Result<(), OrchestrationError> {
        self.admit().map(|_| ())
    }

    /// Like [`acquire`](Self::acquire), returning whether the admitted call
    /// holds the half-open trial slot.
    fn admit(&self) -> Result<bool, OrchestrationError> {
        let mut inner = self.inner.lock();
        if !inner.half_open && inner.failure_count >= self.config.threshold {
            if !self.cooldown_elapsed(&inner) {
                return Err(OrchestrationError::breaker_open(&self.name));
            }
            self.enter_half_open(&mut inner);
        }
        if inner.half_open {
            if inner.trial_in_flight {
                return Err(OrchestrationError::breaker_open(&self.name));
            }
            inner.trial_in_flight = true;
            debug!("Circuit breaker '{}' admitted trial call", self.name);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.failure_count > 0 || inner.half_open {
            info!("Circuit breaker '{}' closed after success", self.name);
        }
        inner.failure_count = 0;
        inner.half_open = false;
        inner.trial_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure = Some(self.clock.now());
        if inner.half_open {
            inner.failure_count = self.config.threshold;
            inner.half_open = false;
            inner.trial_in_flight = false;
            warn!("Circuit breaker '{}' trial failed, reopening", self.name);
            return;
        }
        inner.failure_count = inner.failure_count.saturating_add(1);
        if inner.failure_count == self.config.threshold {
            warn!(
                "Circuit breaker '{}' opened after {} failures",
                self.name, inner.failure_count
            );
        }
    }

    /// Release a trial slot without counting the outcome either way.
    fn release_trial(&self) {
        let mut inner = self.inner.lock();
        inner.trial_in_flight = false;
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Current state without performing any transition.
    pub fn state(&self) -> BreakerState {
        let inner = self.inner.lock();
        if inner.half_open {
            BreakerState::HalfOpen
        } else if inner.failure_count < self.config.threshold {
            BreakerState::Closed
        } else if self.cooldown_elapsed(&inner) {
            BreakerState::HalfOpen
        } else {
            BreakerState::Open
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state();
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state,
            failure_count: inner.failure_count,
            last_failure_time: inner.last_failure,
            threshold: self.config.threshold,
            reset_timeout_ms: self.config.reset_timeout.as_millis() as u64,
        }
    }

    /// Gate `op` through the breaker. Only upstream failure kinds are
    /// recorded; validation errors and cancellation leave the count alone.
    ///
    /// Dropping the returned future before `op` resolves gives the trial slot
    /// back, so an abandoned trial never wedges the breaker half-open.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, OrchestrationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, OrchestrationError>>,
    {
        let mut admission = Admission {
            breaker: self,
            holds_trial: self.admit()?,
            settled: false,
        };
        let result = op().await;
        admission.settled = true;
        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                if err.kind.counts_against_breaker() {
                    self.record_failure();
                } else if admission.holds_trial {
                    self.release_trial();
                }
                Err(err)
            }
        }
    }
}

/// One admitted call; releases an unresolved trial slot on drop.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    holds_trial: bool,
    settled: bool,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.holds_trial && !self.settled {
            debug!("Circuit breaker '{}' trial abandoned, releasing slot", self.breaker.name);
            self.breaker.release_trial();
        }
    }
}

/// Named breakers shared across jobs in one process.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: BreakerConfig,
    overrides: HashMap<String, BreakerConfig>,
    clock: Arc<dyn Clock>,
}

impl BreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self::with_clock(default_config, Arc::new(SystemClock))
    }

    pub fn with_clock(default_config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
            overrides: HashMap::new(),
            clock,
        }
    }

    pub fn with_override(mut self, name: impl Into<String>, config: BreakerConfig) -> Self {
        self.overrides.insert(name.into(), config);
        self
    }

    /// Breaker for `name`, created on first use.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = self
                    .overrides
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| self.default_config.clone());
                Arc::new(CircuitBreaker::new(name, config, self.clock.clone()))
            })
            .clone()
    }

    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut all: Vec<BreakerSnapshot> = self.breakers.iter().map(|b| b.snapshot()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use crate::domain::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn breaker(threshold: u32, reset_secs: u64) -> (Arc<ManualClock>, CircuitBreaker) {
        let clock = Arc::new(ManualClock::default());
        let config = BreakerConfig {
            threshold,
            reset_timeout: Duration::from_secs(reset_secs),
        };
        (clock.clone(), CircuitBreaker::new("test", config, clock))
    }

    #[test]
    fn test_trips_after_threshold_failures() {
        let (_clock, cb) = breaker(5, 60);
        for _ in 0..4 {
            cb.record_failure();
            assert!(!cb.is_open());
        }
        cb.record_failure();
        assert!(cb.is_open());
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let (clock, cb) = breaker(5, 60);
        for _ in 0..5 {
            cb.record_failure();
        }
        clock.advance(chrono::Duration::seconds(61));
        assert!(!cb.is_open());
        assert_eq!(cb.failure_count(), 2);
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_half_open_admits_exactly_one_trial() {
        let (clock, cb) = breaker(4, 10);
        for _ in 0..4 {
            cb.record_failure();
        }
        clock.advance(chrono::Duration::seconds(11));
        assert!(cb.acquire().is_ok());
        let second = cb.acquire().unwrap_err();
        assert_eq!(second.kind, ErrorKind::BreakerOpen);
    }

    #[test]
    fn test_failed_trial_reopens_with_fresh_cooldown() {
        let (clock, cb) = breaker(4, 10);
        for _ in 0..4 {
            cb.record_failure();
        }
        clock.advance(chrono::Duration::seconds(11));
        cb.acquire().unwrap();
        cb.record_failure();
        assert_eq!(cb.failure_count(), 4);
        assert!(cb.is_open());
        clock.advance(chrono::Duration::seconds(5));
        assert!(cb.is_open());
    }

    #[test]
    fn test_success_resets_count() {
        let (_clock, cb) = breaker(5, 60);
        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_work() {
        let (_clock, cb) = breaker(1, 60);
        cb.record_failure();
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = cb
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::BreakerOpen);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validation_errors_do_not_count() {
        let (_clock, cb) = breaker(2, 60);
        for _ in 0..5 {
            let _: Result<(), _> = cb
                .call(|| async { Err(OrchestrationError::validation("bad json")) })
                .await;
        }
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_trial_releases_slot() {
        let (clock, cb) = breaker(2, 10);
        cb.record_failure();
        cb.record_failure();
        clock.advance(chrono::Duration::seconds(11));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            cb.call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, OrchestrationError>(())
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(!cb.is_open());

        let result = cb.call(|| async { Ok::<_, OrchestrationError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_stale_call_does_not_release_trial_slot() {
        let (clock, cb) = breaker(2, 10);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        // Admitted while closed, resolves after the breaker went half-open
        let stale = cb.call(|| async move {
            let _ = rx.await;
            Err::<(), _>(OrchestrationError::validation("bad json"))
        });
        tokio::pin!(stale);
        assert!(futures::poll!(&mut stale).is_pending());

        cb.record_failure();
        cb.record_failure();
        clock.advance(chrono::Duration::seconds(11));
        cb.acquire().unwrap();

        tx.send(()).unwrap();
        assert_eq!(stale.await.unwrap_err().kind, ErrorKind::Validation);
        assert!(cb.is_open());
        assert_eq!(cb.acquire().unwrap_err().kind, ErrorKind::BreakerOpen);
    }

    #[test]
    fn test_registry_returns_shared_instances() {
        let registry = BreakerRegistry::default().with_override(
            "completion",
            BreakerConfig {
                threshold: 2,
                reset_timeout: Duration::from_secs(1),
            },
        );
        let a = registry.get("completion");
        let b = registry.get("completion");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.config().threshold, 2);
        assert_eq!(registry.get("other").config().threshold, 5);
        assert_eq!(registry.snapshot().len(), 2);
    }
}
