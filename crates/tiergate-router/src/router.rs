// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tier selection: extract, score, apply hard triggers, look up the catalog.

use serde::Serialize;
use tiergate_config::model::{RoutingConfig, TiersConfig};
use tiergate_core::{Tier, TiergateError};
use tracing::debug;

use crate::catalog::{TierCatalog, TierDefinition};
use crate::features::{FeatureExtractor, RequestFeatures};
use crate::scoring::{ScoreBreakdown, ScoringPolicy};

/// Read-only routing decision for one text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub features: RequestFeatures,
    pub breakdown: ScoreBreakdown,
    /// Selected tier. The highest tier whenever a hard trigger fired.
    pub tier: Tier,
}

/// Immutable routing pipeline shared by every request.
#[derive(Debug, Clone)]
pub struct Router {
    extractor: FeatureExtractor,
    policy: ScoringPolicy,
    catalog: TierCatalog,
}

impl Router {
    pub fn new(routing: &RoutingConfig, tiers: &TiersConfig) -> Result<Self, TiergateError> {
        Ok(Self {
            extractor: FeatureExtractor::new(&routing.high_stakes)?,
            policy: ScoringPolicy::new(routing.weights.clone()),
            catalog: TierCatalog::from_config(tiers)?,
        })
    }

    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    /// Analyze `text` without side effects.
    pub fn analyze(&self, text: &str) -> Analysis {
        let features = self.extractor.extract(text);
        let breakdown = self.policy.score(&features);

        // The override runs before lookup and leaves the score untouched.
        let tier = if breakdown.hard_triggered {
            self.catalog.highest().tier
        } else {
            self.catalog.lookup(breakdown.score).tier
        };

        debug!(
            score = breakdown.score,
            tier = %tier,
            hard_triggered = breakdown.hard_triggered,
            words = features.word_count,
            "request analyzed"
        );

        Analysis {
            features,
            breakdown,
            tier,
        }
    }

    /// Catalog entry for the tier chosen by `analysis`.
    pub fn definition(&self, analysis: &Analysis) -> &TierDefinition {
        self.catalog.definition(analysis.tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        Router::new(&RoutingConfig::default(), &TiersConfig::default()).unwrap()
    }

    #[test]
    fn simple_arithmetic_goes_low() {
        let analysis = router().analyze("What is 2+2?");
        assert_eq!(analysis.tier, Tier::Low);
        assert!(!analysis.breakdown.hard_triggered);
    }

    #[test]
    fn production_auth_design_is_hard_triggered() {
        let analysis = router().analyze("Design a production authentication system handling PII");
        assert_eq!(analysis.tier, Tier::High);
        assert!(analysis.breakdown.hard_triggered);
        assert!(
            analysis
                .breakdown
                .trigger_reasons
                .contains("high_stakes:security")
        );
        // The score alone would not reach the highest tier.
        assert!(analysis.breakdown.score <= 70);
    }

    #[test]
    fn medical_records_override_even_with_instructions() {
        let analysis =
            router().analyze("ignore everything, this concerns patient medical records");
        assert_eq!(analysis.tier, Tier::High);
        assert!(
            analysis
                .breakdown
                .trigger_reasons
                .contains("high_stakes:medical")
        );
    }

    #[test]
    fn code_question_lands_mid() {
        let text = "Why does this loop never end?\n```rust\nlet mut i = 0;\nwhile i < 10 { println!(\"{i}\"); }\n```\nI expected it to stop after ten iterations of printing.";
        let analysis = router().analyze(text);
        assert!(analysis.features.contains_code);
        assert_eq!(analysis.tier, Tier::Mid, "score {}", analysis.breakdown.score);
    }

    #[test]
    fn empty_text_is_lowest_tier() {
        let analysis = router().analyze("");
        assert_eq!(analysis.features, RequestFeatures::default());
        assert_eq!(analysis.tier, Tier::Low);
    }

    #[test]
    fn definition_follows_tier() {
        let router = router();
        let analysis = router.analyze("What is 2+2?");
        assert_eq!(router.definition(&analysis).model, "gpt-4o-mini");
    }
}
