// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the tiergate routing engine.

use std::time::Duration;

use serde::Serialize;
use strum::Display;
use thiserror::Error;

/// Classification of a failed provider call.
///
/// The retry policy only retries the transient kinds; the fatal kinds fail
/// after a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProviderFailureKind {
    /// Connection refused, reset, DNS failure, or request timeout.
    Connectivity,
    /// The provider rejected the call with its own rate limit (HTTP 429).
    RateLimited,
    /// Provider-side transient failure (HTTP 5xx, overloaded).
    ServerError,
    /// Bad or missing credentials (HTTP 401/403).
    Authentication,
    /// The provider refused the request as malformed (HTTP 400/404/422).
    InvalidRequest,
    /// The provider answered with a body we could not decode.
    InvalidResponse,
}

impl ProviderFailureKind {
    /// Whether a failure of this kind is worth retrying.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ProviderFailureKind::Connectivity
                | ProviderFailureKind::RateLimited
                | ProviderFailureKind::ServerError
        )
    }
}

/// The primary error type used across all tiergate crates.
#[derive(Debug, Error)]
pub enum TiergateError {
    /// Configuration errors (invalid TOML, broken tier partition, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (ledger connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed or oversized input, rejected before feature extraction.
    #[error("invalid request: {message}")]
    Validation { message: String },

    /// The admission gate refused the caller for this endpoint class.
    #[error("rate limit exceeded for {caller} on {endpoint}, retry after {}s", retry_after.as_secs())]
    RateLimited {
        caller: String,
        endpoint: String,
        retry_after: Duration,
    },

    /// The admission gate refused the call because the period budget would be exceeded.
    #[error("budget exceeded: {message}")]
    BudgetExceeded { message: String },

    /// LLM provider failure, after `retries` retries were spent on it.
    #[error("provider error ({kind}) after {retries} retries: {message}")]
    Provider {
        kind: ProviderFailureKind,
        message: String,
        retries: u32,
    },

    /// The caller cancelled the request while it was in flight.
    #[error("request cancelled by caller")]
    Cancelled,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TiergateError {
    /// Shorthand for a provider failure that has not been retried yet.
    pub fn provider(kind: ProviderFailureKind, message: impl Into<String>) -> Self {
        TiergateError::Provider {
            kind,
            message: message.into(),
            retries: 0,
        }
    }

    /// Whether the retry policy should try the operation again.
    pub fn is_transient(&self) -> bool {
        match self {
            TiergateError::Provider { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }

    /// Attach the number of retries consumed to a provider error.
    pub fn with_retries(self, retries: u32) -> Self {
        match self {
            TiergateError::Provider { kind, message, .. } => TiergateError::Provider {
                kind,
                message,
                retries,
            },
            other => other,
        }
    }

    /// Retries consumed before this error surfaced (0 for non-provider errors).
    pub fn retries(&self) -> u32 {
        match self {
            TiergateError::Provider { retries, .. } => *retries,
            _ => 0,
        }
    }

    /// Stable short label for logs and result payloads.
    pub fn kind_label(&self) -> &'static str {
        match self {
            TiergateError::Config(_) => "config",
            TiergateError::Storage { .. } => "storage",
            TiergateError::Validation { .. } => "validation",
            TiergateError::RateLimited { .. } => "rate_limited",
            TiergateError::BudgetExceeded { .. } => "budget_exceeded",
            TiergateError::Provider { kind, .. } if kind.is_transient() => "provider_transient",
            TiergateError::Provider { .. } => "provider_fatal",
            TiergateError::Cancelled => "cancelled",
            TiergateError::Timeout { .. } => "timeout",
            TiergateError::Internal(_) => "internal",
        }
    }

    /// HTTP-style status code a transport layer can map this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            TiergateError::Validation { .. } => 400,
            TiergateError::BudgetExceeded { .. } => 402,
            TiergateError::RateLimited { .. } => 429,
            TiergateError::Cancelled => 499,
            TiergateError::Provider { .. } => 502,
            TiergateError::Timeout { .. } => 504,
            TiergateError::Config(_) | TiergateError::Storage { .. } | TiergateError::Internal(_) => {
                500
            }
        }
    }
}
