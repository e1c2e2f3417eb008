// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Retry Policy
//!
//! [`with_retry`] re-runs an operation while `should_retry` accepts its error,
//! sleeping `backoff × multiplier^(attempt − 1)` between attempts. After
//! `max_attempts` total attempts the last error is returned as-is.
//! [`with_timeout`] races work against a timer and turns an elapsed timer into
//! a retryable `Timeout` error.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::error::OrchestrationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(default = "default_backoff", with = "humantime_serde")]
    pub backoff: Duration,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            backoff,
            multiplier,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        self.backoff.mul_f64(factor.min(1e6))
    }
}

/// Default classification: retry exactly the retryable kinds.
pub fn retry_transient(err: &OrchestrationError) -> bool {
    err.is_retryable()
}

pub async fn with_retry<T, F, Fut, P>(
    policy: &RetryPolicy,
    should_retry: P,
    mut op: F,
) -> Result<T, OrchestrationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OrchestrationError>>,
    P: Fn(&OrchestrationError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && should_retry(&err) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "Attempt {}/{} failed ({}), retrying in {:?}",
                    attempt, max_attempts, err, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!("Giving up after {} attempt(s): {}", attempt, err);
                return Err(err);
            }
        }
    }
}

pub async fn with_timeout<T, Fut>(duration: Duration, work: Fut) -> Result<T, OrchestrationError>
where
    Fut: Future<Output = Result<T, OrchestrationError>>,
{
    match tokio::time::timeout(duration, work).await {
        Ok(result) => result,
        Err(_) => Err(OrchestrationError::timeout(format!(
            "operation exceeded {:?}",
            duration
        ))),
    }
}
