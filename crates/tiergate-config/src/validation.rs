// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: the tier score ranges,
//! threshold and budget bounds, keyword classes, and retry bounds.

use crate::diagnostic::ConfigError;
use crate::model::{TierConfig, TiergateConfig};

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TiergateConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    // Engine limits
    if config.engine.max_prompt_chars == 0 {
        fail("engine.max_prompt_chars must be at least 1".to_string());
    }
    if config.engine.max_output_tokens_limit == 0 {
        fail("engine.max_output_tokens_limit must be at least 1".to_string());
    }
    if config.engine.default_output_tokens == 0
        || config.engine.default_output_tokens > config.engine.max_output_tokens_limit
    {
        fail(format!(
            "engine.default_output_tokens must be in 1..={}, got {}",
            config.engine.max_output_tokens_limit, config.engine.default_output_tokens
        ));
    }
    if config.engine.request_timeout_secs == 0 {
        fail("engine.request_timeout_secs must be at least 1".to_string());
    }

    // Routing policy
    let threshold = config.routing.confidence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        fail(format!(
            "routing.confidence_threshold must be within [0, 1], got {threshold}"
        ));
    }
    if config.routing.high_stakes.is_empty() {
        fail("routing.high_stakes must define at least one keyword class".to_string());
    }
    for (class, words) in &config.routing.high_stakes {
        if words.iter().all(|w| w.trim().is_empty()) {
            fail(format!(
                "routing.high_stakes.{class} must list at least one non-empty keyword"
            ));
        }
    }
    let weights = &config.routing.weights;
    if !(weights.short_max_words < weights.medium_max_words
        && weights.medium_max_words < weights.long_max_words)
    {
        fail(format!(
            "routing.weights word buckets must increase, got {} / {} / {}",
            weights.short_max_words, weights.medium_max_words, weights.long_max_words
        ));
    }

    // Tier partition of 0..=100
    let tiers = [
        ("low", &config.tiers.low),
        ("mid", &config.tiers.mid),
        ("high", &config.tiers.high),
    ];
    for (name, tier) in tiers {
        validate_tier(name, tier, &mut fail);
    }
    if config.tiers.low.min_score != 0 {
        fail(format!(
            "tiers.low.min_score must be 0, got {}",
            config.tiers.low.min_score
        ));
    }
    if config.tiers.high.max_score != 100 {
        fail(format!(
            "tiers.high.max_score must be 100, got {}",
            config.tiers.high.max_score
        ));
    }
    for pair in tiers.windows(2) {
        let (lower_name, lower) = pair[0];
        let (upper_name, upper) = pair[1];
        if u16::from(lower.max_score) + 1 != u16::from(upper.min_score) {
            fail(format!(
                "tiers.{upper_name}.min_score must be tiers.{lower_name}.max_score + 1 ({}), got {}",
                u16::from(lower.max_score) + 1,
                upper.min_score
            ));
        }
    }

    // Budgets
    for (key, value) in [
        ("cost.monthly_budget_usd", config.cost.monthly_budget_usd),
        ("cost.daily_budget_usd", config.cost.daily_budget_usd),
    ] {
        if let Some(v) = value {
            if !(v >= 0.0 && v.is_finite()) {
                fail(format!("{key} must be non-negative, got {v}"));
            }
        }
    }

    // Rate limits
    if config.rate_limit.window_secs == 0 {
        fail("rate_limit.window_secs must be at least 1".to_string());
    }

    // Retry bounds
    let retry = &config.retry;
    if retry.max_attempts == 0 {
        fail("retry.max_attempts must be at least 1".to_string());
    }
    if retry.backoff_floor_ms > retry.backoff_ceiling_ms {
        fail(format!(
            "retry.backoff_floor_ms ({}) must not exceed retry.backoff_ceiling_ms ({})",
            retry.backoff_floor_ms, retry.backoff_ceiling_ms
        ));
    }

    // Storage
    if config.cost.ledger_enabled && config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty when the ledger is enabled".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_tier(name: &str, tier: &TierConfig, fail: &mut impl FnMut(String)) {
    if tier.model.trim().is_empty() {
        fail(format!("tiers.{name}.model must not be empty"));
    }
    if tier.min_score > tier.max_score {
        fail(format!(
            "tiers.{name}.min_score ({}) must not exceed max_score ({})",
            tier.min_score, tier.max_score
        ));
    }
    if !(tier.input_per_mtok >= 0.0 && tier.output_per_mtok >= 0.0) {
        fail(format!("tiers.{name} prices must be non-negative"));
    }
    if tier.max_output_tokens == 0 {
        fail(format!("tiers.{name}.max_output_tokens must be at least 1"));
    }
}
