// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic scoring of request features.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tiergate_config::model::ScoringWeights;

use crate::features::RequestFeatures;

/// Upper bound of the score scale.
pub const MAX_SCORE: u8 = 100;

/// How a score was reached, for logging and for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    /// Sum of the bonuses, clamped to `0..=100`.
    pub score: u8,
    /// Contribution of each non-zero signal, keyed by reason.
    pub bonuses: BTreeMap<String, i32>,
    /// A hard trigger fired; the request goes to the highest tier.
    pub hard_triggered: bool,
    /// Why the hard trigger fired, e.g. `high_stakes:medical`.
    pub trigger_reasons: BTreeSet<String>,
}

/// Maps [`RequestFeatures`] to a [`ScoreBreakdown`] using configured weights.
#[derive(Debug, Clone)]
pub struct ScoringPolicy {
    weights: ScoringWeights,
}

fn weight(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn capped(per_item: u32, items: usize, cap: u32) -> i32 {
    let items = u32::try_from(items).unwrap_or(u32::MAX);
    weight(per_item.saturating_mul(items).min(cap))
}

impl ScoringPolicy {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score `features`. Hard triggers are evaluated alongside and never
    /// change the score itself.
    pub fn score(&self, features: &RequestFeatures) -> ScoreBreakdown {
        let w = &self.weights;
        let mut bonuses = BTreeMap::new();
        let mut add = |reason: &str, value: i32| {
            if value != 0 {
                bonuses.insert(reason.to_string(), value);
            }
        };

        let base = if features.word_count <= w.short_max_words {
            w.short_base
        } else if features.word_count <= w.medium_max_words {
            w.medium_base
        } else if features.word_count <= w.long_max_words {
            w.long_base
        } else {
            w.very_long_base
        };
        add("length", weight(base));

        if features.contains_code {
            add("code", weight(w.code));
        }
        add(
            "high_stakes",
            capped(
                w.high_stakes_per_class,
                features.high_stakes_classes.len(),
                u32::MAX,
            ),
        );
        add(
            "questions",
            capped(
                w.extra_question,
                features.question_count.saturating_sub(1),
                w.extra_question_cap,
            ),
        );
        add(
            "structure",
            capped(
                w.structure_item,
                features.list_or_structure_count,
                w.structure_cap,
            ),
        );
        if features.has_stack_trace {
            add("stack_trace", weight(w.stack_trace));
        }
        if features.hard_reasoning {
            add("hard_reasoning", weight(w.hard_reasoning));
        }
        if features.strict_format {
            add("strict_format", weight(w.strict_format));
        }
        if features.freshness_need {
            add("freshness", weight(w.freshness));
        }

        let total: i64 = bonuses.values().map(|v| i64::from(*v)).sum();
        let score = u8::try_from(total.clamp(0, i64::from(MAX_SCORE))).unwrap_or(MAX_SCORE);

        let trigger_reasons = hard_triggers(features);
        ScoreBreakdown {
            score,
            bonuses,
            hard_triggered: !trigger_reasons.is_empty(),
            trigger_reasons,
        }
    }
}

fn hard_triggers(features: &RequestFeatures) -> BTreeSet<String> {
    let mut reasons: BTreeSet<String> = features
        .high_stakes_classes
        .iter()
        .map(|class| format!("high_stakes:{class}"))
        .collect();
    if features.has_stack_trace {
        reasons.insert("stack_trace".to_string());
    }
    if features.hard_reasoning && features.is_multi_part() {
        reasons.insert("hard_reasoning_multi_part".to_string());
    }
    reasons
}
