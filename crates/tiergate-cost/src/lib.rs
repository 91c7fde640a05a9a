// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost tracking, budget enforcement, and pricing for the tiergate routing engine.
//!
//! This crate provides:
//! - **Pricing**: per-tier cost calculation and pre-call estimates
//! - **Token estimation**: conservative input token counts before a call
//! - **Budget tracker**: the budget half of the admission state, with reservations
//! - **Cost ledger**: persistent record of every charged stage
//! - **Request log**: one row per routed request, and statistics over it

pub mod budget;
pub mod ledger;
pub mod pricing;
pub mod request_log;
pub mod tokens;

pub use budget::BudgetTracker;
pub use ledger::{CostLedger, CostRecord, LedgerStage};
pub use pricing::{ModelPricing, calculate_cost};
pub use request_log::{RECENT_REQUESTS, RequestLogEntry, RequestStatistics};
pub use tokens::{estimate_input_tokens, estimate_output_tokens};
