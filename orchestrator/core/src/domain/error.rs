// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Orchestration Errors
//!
//! Every failure that crosses the agent, retrieval or completion boundary is
//! an [`OrchestrationError`] carrying an [`ErrorKind`] attached where the
//! failure originated. Retry and breaker logic match on the kind; the message
//! is for humans only.
//!
//! | Kind | Retryable | Counts against breaker |
//! |------|-----------|------------------------|
//! | `Timeout` | yes | yes |
//! | `RateLimited` | yes | yes |
//! | `UpstreamUnavailable` | yes | yes |
//! | `Validation` | no | no |
//! | `Cancelled` | no | no |
//! | `BreakerOpen` | no | no |
//! | `Internal` | no | no |

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sparkplan_cortex::RetrievalError;
use std::fmt;

use crate::domain::llm::LLMError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    UpstreamUnavailable,
    Validation,
    Cancelled,
    BreakerOpen,
    Internal,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::RateLimited | ErrorKind::UpstreamUnavailable
        )
    }

    /// Only upstream misbehaviour trips a breaker.
    pub fn counts_against_breaker(&self) -> bool {
        self.is_retryable()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::Validation => "validation",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::BreakerOpen => "breaker_open",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct OrchestrationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl OrchestrationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamUnavailable, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "job was cancelled")
    }

    pub fn breaker_open(name: &str) -> Self {
        Self::new(
            ErrorKind::BreakerOpen,
            format!("circuit breaker '{}' is open", name),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Builds an error from untyped upstream text, classifying it on the way in.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(classify_message(&message), message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out", "deadline exceeded"];

const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "rate_limit", "ratelimit", "too many requests"];

const UPSTREAM_MARKERS: &[&str] = &[
    "internal server error",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    "connection reset",
    "connection refused",
    "econnreset",
    "econnrefused",
    "overloaded",
    "socket hang up",
];

/// HTTP status codes only count as standalone numbers ("1500 mm" is not a 500).
static RATE_LIMIT_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b429\b").expect("static status regex"));
static UPSTREAM_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b50[0234]\b").expect("static status regex"));

/// Maps free-form upstream error text onto an [`ErrorKind`].
///
/// Unrecognised text is `Internal`, which is never retried.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    // "gateway timeout" is a 504; check upstream markers for it before the generic timeout
    if lower.contains("gateway timeout") {
        return ErrorKind::UpstreamUnavailable;
    }
    if contains_any(TIMEOUT_MARKERS) {
        ErrorKind::Timeout
    } else if contains_any(RATE_LIMIT_MARKERS) || RATE_LIMIT_STATUS.is_match(&lower) {
        ErrorKind::RateLimited
    } else if contains_any(UPSTREAM_MARKERS) || UPSTREAM_STATUS.is_match(&lower) {
        ErrorKind::UpstreamUnavailable
    } else {
        ErrorKind::Internal
    }
}

impl From<LLMError> for OrchestrationError {
    fn from(err: LLMError) -> Self {
        let message = err.to_string();
        let kind = match &err {
            LLMError::Timeout(_) => ErrorKind::Timeout,
            LLMError::RateLimit => ErrorKind::RateLimited,
            LLMError::Upstream { .. } => ErrorKind::UpstreamUnavailable,
            LLMError::Network(text) => match classify_message(text) {
                ErrorKind::Internal => ErrorKind::UpstreamUnavailable,
                kind => kind,
            },
            LLMError::Authentication(_)
            | LLMError::ModelNotFound(_)
            | LLMError::InvalidInput(_) => ErrorKind::Validation,
            LLMError::Provider(text) => classify_message(text),
        };
        Self::new(kind, message)
    }
}

impl From<RetrievalError> for OrchestrationError {
    fn from(err: RetrievalError) -> Self {
        let kind = match &err {
            RetrievalError::UnknownKnowledgeBase(_) => ErrorKind::Validation,
            RetrievalError::Unavailable(_) => ErrorKind::UpstreamUnavailable,
            RetrievalError::Load(_) => ErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}
