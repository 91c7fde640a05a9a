// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static table mapping score ranges to tiers, models, and prices.

use serde::Serialize;
use tiergate_config::model::{TierConfig, TiersConfig};
use tiergate_core::{Tier, TiergateError};
use tiergate_cost::ModelPricing;

use crate::scoring::MAX_SCORE;

/// One tier of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierDefinition {
    pub tier: Tier,
    /// Inclusive lower score bound.
    pub min_score: u8,
    /// Inclusive upper score bound.
    pub max_score: u8,
    pub model: String,
    pub pricing: ModelPricing,
    pub max_output_tokens: u32,
    /// Whether Stage A at this tier asks for a self-evaluation. False only
    /// for the highest tier, which has nothing to escalate to.
    pub self_eval_enabled: bool,
}

impl TierDefinition {
    fn from_config(tier: Tier, config: &TierConfig) -> Self {
        Self {
            tier,
            min_score: config.min_score,
            max_score: config.max_score,
            model: config.model.clone(),
            pricing: ModelPricing::from(config),
            max_output_tokens: config.max_output_tokens,
            self_eval_enabled: !tier.is_highest(),
        }
    }

    pub fn contains(&self, score: u8) -> bool {
        (self.min_score..=self.max_score).contains(&score)
    }
}

/// Immutable tier table. Construction guarantees the score ranges partition
/// `0..=100` in tier order.
#[derive(Debug, Clone, Serialize)]
pub struct TierCatalog {
    tiers: [TierDefinition; 3],
}

impl TierCatalog {
    pub fn from_config(config: &TiersConfig) -> Result<Self, TiergateError> {
        Self::new([
            TierDefinition::from_config(Tier::Low, &config.low),
            TierDefinition::from_config(Tier::Mid, &config.mid),
            TierDefinition::from_config(Tier::High, &config.high),
        ])
    }

    /// Build a catalog from definitions in ascending tier order.
    pub fn new(tiers: [TierDefinition; 3]) -> Result<Self, TiergateError> {
        for (definition, expected) in tiers.iter().zip(Tier::ALL) {
            if definition.tier != expected {
                return Err(TiergateError::Config(format!(
                    "tier catalog out of order: expected {expected}, found {}",
                    definition.tier
                )));
            }
        }

        for score in 0..=MAX_SCORE {
            let owners: Vec<Tier> = tiers
                .iter()
                .filter(|d| d.contains(score))
                .map(|d| d.tier)
                .collect();
            match owners.as_slice() {
                [_] => {}
                [] => {
                    return Err(TiergateError::Config(format!(
                        "tier ranges leave score {score} unassigned"
                    )));
                }
                many => {
                    return Err(TiergateError::Config(format!(
                        "tier ranges overlap at score {score}: {many:?}"
                    )));
                }
            }
        }

        Ok(Self { tiers })
    }

    /// The tier whose range contains `score` (clamped to the scale).
    pub fn lookup(&self, score: u8) -> &TierDefinition {
        let score = score.min(MAX_SCORE);
        self.tiers
            .iter()
            .find(|d| d.contains(score))
            .unwrap_or(&self.tiers[2])
    }

    pub fn definition(&self, tier: Tier) -> &TierDefinition {
        match tier {
            Tier::Low => &self.tiers[0],
            Tier::Mid => &self.tiers[1],
            Tier::High => &self.tiers[2],
        }
    }

    /// The definition one tier above `tier`, if any.
    pub fn next(&self, tier: Tier) -> Option<&TierDefinition> {
        tier.next().map(|t| self.definition(t))
    }

    pub fn highest(&self) -> &TierDefinition {
        &self.tiers[2]
    }

    pub fn iter(&self) -> impl Iterator<Item = &TierDefinition> {
        self.tiers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TierCatalog {
        TierCatalog::from_config(&TiersConfig::default()).unwrap()
    }

    #[test]
    fn every_score_maps_to_exactly_one_tier() {
        let catalog = catalog();
        for score in 0..=MAX_SCORE {
            let matching = catalog.iter().filter(|d| d.contains(score)).count();
            assert_eq!(matching, 1, "score {score}");
        }
    }

    #[test]
    fn default_boundaries() {
        let catalog = catalog();
        assert_eq!(catalog.lookup(0).tier, Tier::Low);
        assert_eq!(catalog.lookup(30).tier, Tier::Low);
        assert_eq!(catalog.lookup(31).tier, Tier::Mid);
        assert_eq!(catalog.lookup(70).tier, Tier::Mid);
        assert_eq!(catalog.lookup(71).tier, Tier::High);
        assert_eq!(catalog.lookup(100).tier, Tier::High);
        assert_eq!(catalog.lookup(255).tier, Tier::High);
    }

    #[test]
    fn only_highest_tier_skips_self_eval() {
        let catalog = catalog();
        assert!(catalog.definition(Tier::Low).self_eval_enabled);
        assert!(catalog.definition(Tier::Mid).self_eval_enabled);
        assert!(!catalog.definition(Tier::High).self_eval_enabled);
    }

    #[test]
    fn next_tier_walks_up() {
        let catalog = catalog();
        assert_eq!(catalog.next(Tier::Low).unwrap().tier, Tier::Mid);
        assert_eq!(catalog.next(Tier::Mid).unwrap().tier, Tier::High);
        assert!(catalog.next(Tier::High).is_none());
        assert_eq!(catalog.highest().model, "o1");
    }

    #[test]
    fn gap_is_rejected() {
        let mut config = TiersConfig::default();
        config.mid.min_score = 32;
        let err = TierCatalog::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("score 31 unassigned"), "got {err}");
    }

    #[test]
    fn overlap_is_rejected() {
        let mut config = TiersConfig::default();
        config.low.max_score = 40;
        let err = TierCatalog::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("overlap at score 31"), "got {err}");
    }
}
