// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the tiergate routing engine.
//!
//! Provider adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility. [`BudgetStore`] is
//! synchronous: its critical sections never await.

pub mod adapter;
pub mod budget;
pub mod provider;

pub use adapter::PluginAdapter;
pub use budget::BudgetStore;
pub use provider::{ProviderAdapter, ProviderStream};
