// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the tiergate routing engine.
//!
//! This crate provides the error taxonomy, the capability tiers, the provider
//! request/response types, and the adapter traits that the rest of the
//! workspace implements or consumes.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ProviderFailureKind, TiergateError};
pub use types::{
    BudgetStatus, HealthStatus, ProviderRequest, ProviderResponse, ProviderStreamChunk,
    StreamEventType, Tier, TokenUsage,
};

pub use traits::{BudgetStore, PluginAdapter, ProviderAdapter, ProviderStream};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering_is_low_mid_high() {
        assert!(Tier::Low < Tier::Mid);
        assert!(Tier::Mid < Tier::High);
        assert_eq!(Tier::ALL, [Tier::Low, Tier::Mid, Tier::High]);
    }

    #[test]
    fn tier_next_stops_at_high() {
        assert_eq!(Tier::Low.next(), Some(Tier::Mid));
        assert_eq!(Tier::Mid.next(), Some(Tier::High));
        assert_eq!(Tier::High.next(), None);
        assert!(Tier::High.is_highest());
        assert!(!Tier::Mid.is_highest());
    }

    #[test]
    fn tier_display_and_parse() {
        use std::str::FromStr;
        for tier in Tier::ALL {
            let s = tier.to_string();
            assert_eq!(Tier::from_str(&s).unwrap(), tier);
        }
        assert_eq!(Tier::Mid.to_string(), "mid");
    }

    #[test]
    fn tier_serializes_lowercase() {
        let json = serde_json::to_string(&Tier::High).unwrap();
        assert_eq!(json, "\"high\"");
        let parsed: Tier = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(parsed, Tier::Low);
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_provider_adapter<T: ProviderAdapter>() {}
        fn _assert_budget_store<T: BudgetStore>() {}
    }
}
