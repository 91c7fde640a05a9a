// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the tiergate routing engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level tiergate configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TiergateConfig {
    /// Request handling limits and logging.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Scoring weights, escalation threshold, and high-stakes keywords.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Per-tier model, score range, and pricing.
    #[serde(default)]
    pub tiers: TiersConfig,

    /// Budget ceilings and cost ledger settings.
    #[serde(default)]
    pub cost: CostConfig,

    /// Per-caller sliding window limits.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Backoff policy around provider calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// LLM provider endpoint and credentials.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Request handling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Longest accepted request text, in characters.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,

    /// Output token cap used when the caller does not pass one.
    #[serde(default = "default_output_tokens")]
    pub default_output_tokens: u32,

    /// Largest output token cap a caller may request.
    #[serde(default = "default_max_output_tokens_limit")]
    pub max_output_tokens_limit: u32,

    /// Wall-clock limit for one routed request, across both stages.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            max_prompt_chars: default_max_prompt_chars(),
            default_output_tokens: default_output_tokens(),
            max_output_tokens_limit: default_max_output_tokens_limit(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_prompt_chars() -> usize {
    50_000
}

fn default_output_tokens() -> u32 {
    1000
}

fn default_max_output_tokens_limit() -> u32 {
    4000
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// Routing policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Stage A confidence strictly below this value escalates.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Score contributions of each feature.
    #[serde(default)]
    pub weights: ScoringWeights,

    /// Keyword classes that force the highest tier. Matching is
    /// case-insensitive on whole words or phrases.
    #[serde(default = "default_high_stakes")]
    pub high_stakes: BTreeMap<String, Vec<String>>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            weights: ScoringWeights::default(),
            high_stakes: default_high_stakes(),
        }
    }
}

fn default_confidence_threshold() -> f64 {
    0.75
}

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn default_high_stakes() -> BTreeMap<String, Vec<String>> {
    let mut classes = BTreeMap::new();
    classes.insert(
        "security".to_string(),
        keywords(&[
            "authentication",
            "authorization",
            "password",
            "credential",
            "credentials",
            "encryption",
            "vulnerability",
            "exploit",
            "pii",
            "personal data",
            "access control",
            "security",
        ]),
    );
    classes.insert(
        "medical".to_string(),
        keywords(&[
            "medical",
            "patient",
            "diagnosis",
            "dosage",
            "prescription",
            "symptom",
            "symptoms",
            "treatment",
            "medication",
            "clinical",
        ]),
    );
    classes.insert(
        "legal".to_string(),
        keywords(&[
            "legal",
            "contract",
            "lawsuit",
            "litigation",
            "attorney",
            "lawyer",
            "court",
            "liability",
            "compliance",
            "gdpr",
            "hipaa",
        ]),
    );
    classes.insert(
        "financial".to_string(),
        keywords(&[
            "tax",
            "financial advice",
            "investment",
            "mortgage",
            "loan",
            "retirement planning",
            "stock recommendation",
            "payment",
        ]),
    );
    classes.insert(
        "infrastructure".to_string(),
        keywords(&[
            "production",
            "outage",
            "infrastructure",
            "disaster recovery",
            "database migration",
            "incident",
        ]),
    );
    classes
}

/// Named score contributions. Every weight is additive; the sum is clamped
/// to 0..=100.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringWeights {
    /// Upper word count of the "short" bucket.
    #[serde(default = "default_short_max_words")]
    pub short_max_words: usize,
    /// Upper word count of the "medium" bucket.
    #[serde(default = "default_medium_max_words")]
    pub medium_max_words: usize,
    /// Upper word count of the "long" bucket; anything above is "very long".
    #[serde(default = "default_long_max_words")]
    pub long_max_words: usize,

    #[serde(default = "default_short_base")]
    pub short_base: u32,
    #[serde(default = "default_medium_base")]
    pub medium_base: u32,
    #[serde(default = "default_long_base")]
    pub long_base: u32,
    #[serde(default = "default_very_long_base")]
    pub very_long_base: u32,

    /// Bonus when the text contains code.
    #[serde(default = "default_code_bonus")]
    pub code: u32,
    /// Bonus per matched high-stakes keyword class.
    #[serde(default = "default_high_stakes_bonus")]
    pub high_stakes_per_class: u32,
    /// Bonus per question beyond the first.
    #[serde(default = "default_step_bonus")]
    pub extra_question: u32,
    #[serde(default = "default_step_cap")]
    pub extra_question_cap: u32,
    /// Bonus per list item or structural marker.
    #[serde(default = "default_step_bonus")]
    pub structure_item: u32,
    #[serde(default = "default_step_cap")]
    pub structure_cap: u32,

    #[serde(default = "default_stack_trace_bonus")]
    pub stack_trace: u32,
    #[serde(default = "default_hard_reasoning_bonus")]
    pub hard_reasoning: u32,
    #[serde(default = "default_strict_format_bonus")]
    pub strict_format: u32,
    #[serde(default = "default_freshness_bonus")]
    pub freshness: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            short_max_words: default_short_max_words(),
            medium_max_words: default_medium_max_words(),
            long_max_words: default_long_max_words(),
            short_base: default_short_base(),
            medium_base: default_medium_base(),
            long_base: default_long_base(),
            very_long_base: default_very_long_base(),
            code: default_code_bonus(),
            high_stakes_per_class: default_high_stakes_bonus(),
            extra_question: default_step_bonus(),
            extra_question_cap: default_step_cap(),
            structure_item: default_step_bonus(),
            structure_cap: default_step_cap(),
            stack_trace: default_stack_trace_bonus(),
            hard_reasoning: default_hard_reasoning_bonus(),
            strict_format: default_strict_format_bonus(),
            freshness: default_freshness_bonus(),
        }
    }
}

fn default_short_max_words() -> usize {
    15
}

fn default_medium_max_words() -> usize {
    80
}

fn default_long_max_words() -> usize {
    300
}

fn default_short_base() -> u32 {
    5
}

fn default_medium_base() -> u32 {
    20
}

fn default_long_base() -> u32 {
    35
}

fn default_very_long_base() -> u32 {
    45
}

fn default_code_bonus() -> u32 {
    20
}

fn default_high_stakes_bonus() -> u32 {
    25
}

fn default_step_bonus() -> u32 {
    5
}

fn default_step_cap() -> u32 {
    15
}

fn default_stack_trace_bonus() -> u32 {
    15
}

fn default_hard_reasoning_bonus() -> u32 {
    20
}

fn default_strict_format_bonus() -> u32 {
    10
}

fn default_freshness_bonus() -> u32 {
    10
}

/// One capability tier: its model, score range, and prices.
///
/// Fields carry no serde defaults of their own; figment layers partial
/// `[tiers.*]` tables over the compiled per-tier defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TierConfig {
    /// Provider model identifier.
    pub model: String,
    /// Lowest score (inclusive) routed to this tier.
    pub min_score: u8,
    /// Highest score (inclusive) routed to this tier.
    pub max_score: u8,
    /// USD per million input tokens.
    pub input_per_mtok: f64,
    /// USD per million output tokens.
    pub output_per_mtok: f64,
    /// Upper bound on output tokens sent to this tier's model.
    pub max_output_tokens: u32,
}

/// The three tiers, lowest first.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TiersConfig {
    #[serde(default = "default_low_tier")]
    pub low: TierConfig,
    #[serde(default = "default_mid_tier")]
    pub mid: TierConfig,
    #[serde(default = "default_high_tier")]
    pub high: TierConfig,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            low: default_low_tier(),
            mid: default_mid_tier(),
            high: default_high_tier(),
        }
    }
}

fn default_low_tier() -> TierConfig {
    TierConfig {
        model: "gpt-4o-mini".to_string(),
        min_score: 0,
        max_score: 30,
        input_per_mtok: 0.15,
        output_per_mtok: 0.60,
        max_output_tokens: 4000,
    }
}

fn default_mid_tier() -> TierConfig {
    TierConfig {
        model: "gpt-4o".to_string(),
        min_score: 31,
        max_score: 70,
        input_per_mtok: 2.50,
        output_per_mtok: 10.00,
        max_output_tokens: 4000,
    }
}

fn default_high_tier() -> TierConfig {
    TierConfig {
        model: "o1".to_string(),
        min_score: 71,
        max_score: 100,
        input_per_mtok: 15.00,
        output_per_mtok: 60.00,
        max_output_tokens: 4000,
    }
}

/// Cost tracking and budget configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CostConfig {
    /// Maximum monthly spending limit in USD. `None` means no limit.
    #[serde(default = "default_monthly_budget")]
    pub monthly_budget_usd: Option<f64>,

    /// Maximum daily spending limit in USD. `None` means no limit.
    #[serde(default)]
    pub daily_budget_usd: Option<f64>,

    /// Whether completed stages are appended to the SQLite cost ledger.
    #[serde(default = "default_ledger_enabled")]
    pub ledger_enabled: bool,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            monthly_budget_usd: default_monthly_budget(),
            daily_budget_usd: None,
            ledger_enabled: default_ledger_enabled(),
        }
    }
}

fn default_monthly_budget() -> Option<f64> {
    Some(100.0)
}

fn default_ledger_enabled() -> bool {
    true
}

/// Sliding window rate limit configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Disable to admit every caller regardless of request rate.
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,

    /// Length of the trailing window, in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Requests per caller per window for `route`.
    #[serde(default = "default_route_per_window")]
    pub route_per_window: u32,

    /// Requests per caller per window for `analyze`.
    #[serde(default = "default_analyze_per_window")]
    pub analyze_per_window: u32,

    /// Requests per caller per window for `status`.
    #[serde(default = "default_status_per_window")]
    pub status_per_window: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            window_secs: default_window_secs(),
            route_per_window: default_route_per_window(),
            analyze_per_window: default_analyze_per_window(),
            status_per_window: default_status_per_window(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_window_secs() -> u64 {
    60
}

fn default_route_per_window() -> u32 {
    20
}

fn default_analyze_per_window() -> u32 {
    60
}

fn default_status_per_window() -> u32 {
    120
}

/// Retry policy configuration for provider calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per stage, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Shortest backoff between attempts, in milliseconds.
    #[serde(default = "default_backoff_floor_ms")]
    pub backoff_floor_ms: u64,

    /// Longest backoff between attempts, in milliseconds.
    #[serde(default = "default_backoff_ceiling_ms")]
    pub backoff_ceiling_ms: u64,

    /// Base of the exponential backoff, in milliseconds.
    #[serde(default = "default_backoff_multiplier_ms")]
    pub backoff_multiplier_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_floor_ms: default_backoff_floor_ms(),
            backoff_ceiling_ms: default_backoff_ceiling_ms(),
            backoff_multiplier_ms: default_backoff_multiplier_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_floor_ms() -> u64 {
    2_000
}

fn default_backoff_ceiling_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier_ms() -> u64 {
    1_000
}

/// OpenAI-compatible provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// API key. `None` falls back to the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the chat completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-call HTTP timeout, in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    60
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database holding the cost ledger.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tiergate").join("tiergate.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "tiergate.db".to_string())
}
