// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic request routing for tiergate.
//!
//! This crate provides:
//! - [`FeatureExtractor`]: regex-based signals over the request text
//! - [`ScoringPolicy`]: weighted 0-100 score plus hard-trigger detection
//! - [`TierCatalog`]: score ranges mapped to tiers, models, and prices
//! - [`Router`]: the three above combined into an [`Analysis`]
//! - [`parse_reply`]: tolerant parsing of a model's self-evaluation

pub mod catalog;
pub mod features;
pub mod router;
pub mod scoring;
pub mod selfeval;

pub use catalog::{TierCatalog, TierDefinition};
pub use features::{FeatureExtractor, RequestFeatures};
pub use router::{Analysis, Router};
pub use scoring::{MAX_SCORE, ScoreBreakdown, ScoringPolicy};
pub use selfeval::{
    ParsedReply, SELF_EVAL_INSTRUCTION, SELF_EVAL_MARKER, SelfEvaluation, parse_reply,
    router_context,
};
