// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tier pricing and cost calculation.
//!
//! Prices are USD per million tokens and come from the `[tiers.*]`
//! configuration, so they follow whatever model a tier is mapped to.

use serde::Serialize;
use tiergate_config::model::TierConfig;
use tiergate_core::TokenUsage;

/// Per-model pricing in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelPricing {
    /// Cost per million input tokens.
    pub input_per_mtok: f64,
    /// Cost per million output tokens.
    pub output_per_mtok: f64,
}

impl ModelPricing {
    pub fn new(input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }

    /// Pre-call upper estimate: estimated input plus the full output allowance.
    pub fn estimate(&self, estimated_input_tokens: u32, max_output_tokens: u32) -> f64 {
        calculate_cost(
            &TokenUsage {
                input_tokens: estimated_input_tokens,
                output_tokens: max_output_tokens,
            },
            self,
        )
    }
}

impl From<&TierConfig> for ModelPricing {
    fn from(tier: &TierConfig) -> Self {
        Self::new(tier.input_per_mtok, tier.output_per_mtok)
    }
}

/// Calculate cost in USD for a given token usage and pricing.
///
/// Formula: sum of (tokens / 1_000_000) * price_per_million for each token type.
pub fn calculate_cost(usage: &TokenUsage, pricing: &ModelPricing) -> f64 {
    let input = (f64::from(usage.input_tokens) / 1_000_000.0) * pricing.input_per_mtok;
    let output = (f64::from(usage.output_tokens) / 1_000_000.0) * pricing.output_per_mtok;
    input + output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculate_cost_per_million() {
        let pricing = ModelPricing::new(2.50, 10.00);
        let usage = TokenUsage {
            input_tokens: 1000,
            output_tokens: 500,
        };
        // 1000/1M * 2.50 + 500/1M * 10.00
        let expected = 0.0025 + 0.005;
        let cost = calculate_cost(&usage, &pricing);
        assert!((cost - expected).abs() < 1e-12, "expected {expected}, got {cost}");
    }

    #[test]
    fn zero_tokens_zero_cost() {
        let pricing = ModelPricing::new(15.0, 60.0);
        assert_eq!(calculate_cost(&TokenUsage::default(), &pricing), 0.0);
    }

    #[test]
    fn estimate_charges_full_output_allowance() {
        let pricing = ModelPricing::new(0.15, 0.60);
        let estimate = pricing.estimate(100, 1000);
        let expected = 100.0 / 1e6 * 0.15 + 1000.0 / 1e6 * 0.60;
        assert!((estimate - expected).abs() < 1e-12);
    }

    #[test]
    fn pricing_from_tier_config() {
        let tier = TierConfig {
            model: "m".into(),
            min_score: 0,
            max_score: 100,
            input_per_mtok: 1.0,
            output_per_mtok: 2.0,
            max_output_tokens: 10,
        };
        assert_eq!(ModelPricing::from(&tier), ModelPricing::new(1.0, 2.0));
    }
}
