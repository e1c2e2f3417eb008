// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Runner
//!
//! Runs one agent core with the full recovery stack:
//!
//! ```text
//! retry( completion breaker( timeout( core.run ) ) )
//!   └─ Timeout on splittable input → halve, run both halves concurrently, merge
//!   └─ any other terminal error    → fallback core, tried once
//! ```
//!
//! Timeouts are not retried when the input can still be split; splitting is
//! the recovery for work that is too large for one call.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::agent::{AgentCore, AgentOutput, ProgressReporter, RetrievedContext};
use crate::domain::circuit_breaker::{BreakerRegistry, COMPLETION_BREAKER};
use crate::domain::error::{ErrorKind, OrchestrationError};
use crate::domain::events::JobEvent;
use crate::domain::job::{AgentKind, JobId, JobInputs};
use crate::domain::retry::{with_retry, with_timeout, RetryPolicy};
use crate::domain::split::SplitStrategy;
use crate::infrastructure::event_bus::EventBus;

/// A core plus its optional recovery strategies.
#[derive(Clone)]
pub struct AgentRegistration {
    pub core: Arc<dyn AgentCore>,
    pub split: Option<SplitStrategy<JobInputs, AgentOutput>>,
    pub fallback: Option<Arc<dyn AgentCore>>,
}

impl AgentRegistration {
    pub fn new(core: Arc<dyn AgentCore>) -> Self {
        Self {
            core,
            split: None,
            fallback: None,
        }
    }

    pub fn with_split(mut self, strategy: SplitStrategy<JobInputs, AgentOutput>) -> Self {
        self.split = Some(strategy);
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn AgentCore>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn kind(&self) -> AgentKind {
        self.core.kind()
    }
}

/// Everything one agent run needs besides its registration.
#[derive(Clone, Copy)]
pub struct RunScope<'a> {
    pub job_id: JobId,
    pub progress: &'a dyn ProgressReporter,
    pub context: &'a RetrievedContext,
}

#[derive(Clone)]
pub struct AgentRunner {
    breakers: Arc<BreakerRegistry>,
    retry: RetryPolicy,
    timeout: Duration,
    events: EventBus,
}

impl AgentRunner {
    pub fn new(breakers: Arc<BreakerRegistry>, retry: RetryPolicy, timeout: Duration, events: EventBus) -> Self {
        Self {
            breakers,
            retry,
            timeout,
            events,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run(
        &self,
        registration: &AgentRegistration,
        inputs: &JobInputs,
        scope: RunScope<'_>,
    ) -> Result<AgentOutput, OrchestrationError> {
        let err = match self.run_splitting(registration, inputs, scope, 0).await {
            Ok(output) => return Ok(output),
            Err(err) => err,
        };
        if err.kind == ErrorKind::Cancelled || scope.progress.is_cancelled() {
            return Err(err);
        }
        let Some(fallback) = &registration.fallback else {
            return Err(err);
        };

        warn!(
            "{} failed ({}), falling back to {}",
            registration.core.name(),
            err,
            fallback.name()
        );
        self.events.publish(JobEvent::AgentFallback {
            job_id: scope.job_id,
            agent: registration.kind(),
            fallback: fallback.name().to_string(),
            reason: err.to_string(),
        });
        // The fallback does not use the completion service: no breaker, no retry
        with_timeout(self.timeout, fallback.run(inputs, scope.progress, scope.context))
            .await
            .map_err(|fallback_err| {
                OrchestrationError::new(
                    fallback_err.kind,
                    format!("{} (fallback {} also failed: {})", err, fallback.name(), fallback_err.message),
                )
            })
    }

    fn run_splitting<'a>(
        &'a self,
        registration: &'a AgentRegistration,
        inputs: &'a JobInputs,
        scope: RunScope<'a>,
        depth: u32,
    ) -> BoxFuture<'a, Result<AgentOutput, OrchestrationError>> {
        Box::pin(async move {
            let strategy = registration
                .split
                .as_ref()
                .filter(|s| s.applies(inputs, depth));

            let err = match self
                .attempt(registration.core.as_ref(), inputs, scope, strategy.is_none())
                .await
            {
                Ok(output) => return Ok(output),
                Err(err) => err,
            };
            let Some(strategy) = strategy else {
                return Err(err);
            };
            if err.kind != ErrorKind::Timeout {
                return Err(err);
            }

            let (first, second) = (strategy.split)(inputs);
            info!(
                "{} timed out at depth {}, splitting {} circuits into {} + {}",
                registration.core.name(),
                depth,
                inputs.circuits.len(),
                first.circuits.len(),
                second.circuits.len()
            );
            self.events.publish(JobEvent::AgentSplit {
                job_id: scope.job_id,
                agent: registration.kind(),
                depth: depth + 1,
                first_half: first.circuits.len(),
                second_half: second.circuits.len(),
            });

            let (a, b) = tokio::join!(
                self.run_splitting(registration, &first, scope, depth + 1),
                self.run_splitting(registration, &second, scope, depth + 1)
            );
            (strategy.merge)(a?, b?)
        })
    }

    async fn attempt(
        &self,
        core: &dyn AgentCore,
        inputs: &JobInputs,
        scope: RunScope<'_>,
        retry_timeouts: bool,
    ) -> Result<AgentOutput, OrchestrationError> {
        let breaker = self.breakers.get(COMPLETION_BREAKER);
        let should_retry = |e: &OrchestrationError| {
            e.is_retryable() && (retry_timeouts || e.kind != ErrorKind::Timeout) && !scope.progress.is_cancelled()
        };
        with_retry(&self.retry, should_retry, || {
            let breaker = breaker.clone();
            async move {
                breaker
                    .call(|| with_timeout(self.timeout, core.run(inputs, scope.progress, scope.context)))
                    .await
            }
        })
        .await
    }
}
