// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the router, the cost tracker, and provider adapters.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Capability tier a request is routed to.
///
/// Tiers are totally ordered: `Low < Mid < High`. Escalation always moves one
/// step up this order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Cheap and fast; greetings, lookups, arithmetic.
    Low,
    /// General purpose.
    Mid,
    /// Most capable; nothing to escalate to.
    High,
}

impl Tier {
    /// All tiers in ascending order.
    pub const ALL: [Tier; 3] = [Tier::Low, Tier::Mid, Tier::High];

    /// The next tier up, or `None` for the highest tier.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Low => Some(Tier::Mid),
            Tier::Mid => Some(Tier::High),
            Tier::High => None,
        }
    }

    pub fn is_highest(self) -> bool {
        self.next().is_none()
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Token counts reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// A single completion request sent to a provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Provider model identifier for the tier.
    pub model: String,
    /// Tier the model was selected for.
    pub tier: Tier,
    /// System instruction (self-evaluation or router context), if any.
    pub system_prompt: Option<String>,
    /// The user's request text.
    pub text: String,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Whether incremental delivery was requested.
    pub stream: bool,
}

/// A buffered response from a provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Provider-assigned response id.
    pub id: String,
    /// Full response text.
    pub content: String,
    /// Model that produced the response.
    pub model: String,
    /// Why generation stopped, if reported.
    pub stop_reason: Option<String>,
    /// Token usage for the call.
    pub usage: TokenUsage,
}

/// Kind of event carried by a [`ProviderStreamChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventType {
    /// Incremental response text.
    ContentDelta,
    /// Usage report, usually on the final chunk.
    Usage,
    /// End of the response.
    MessageStop,
}

/// A single chunk from a streaming provider response.
#[derive(Debug, Clone)]
pub struct ProviderStreamChunk {
    pub event_type: StreamEventType,
    pub text: Option<String>,
    pub usage: Option<TokenUsage>,
    pub stop_reason: Option<String>,
}

impl ProviderStreamChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            event_type: StreamEventType::ContentDelta,
            text: Some(text.into()),
            usage: None,
            stop_reason: None,
        }
    }

    pub fn usage(usage: TokenUsage) -> Self {
        Self {
            event_type: StreamEventType::Usage,
            text: None,
            usage: Some(usage),
            stop_reason: None,
        }
    }

    pub fn stop(stop_reason: Option<String>) -> Self {
        Self {
            event_type: StreamEventType::MessageStop,
            text: None,
            usage: None,
            stop_reason,
        }
    }
}

/// Snapshot of the budget half of the admission state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    /// Current budget period, e.g. "2026-03".
    pub period: String,
    /// Period ceiling in USD (`None` = unlimited).
    pub monthly_limit_usd: Option<f64>,
    /// Measured spend committed this period.
    pub spent_usd: f64,
    /// Estimates currently reserved by in-flight calls.
    pub reserved_usd: f64,
    /// Ceiling minus spend and reservations (`None` = unlimited).
    pub remaining_usd: Option<f64>,
    /// Spend as a percentage of the ceiling (0 when unlimited).
    pub percentage_used: f64,
    /// Number of committed provider calls this period.
    pub request_count: u64,
    /// Spend committed today.
    pub daily_spent_usd: f64,
    /// Daily ceiling in USD (`None` = unlimited).
    pub daily_limit_usd: Option<f64>,
}
