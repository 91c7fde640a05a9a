// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Budget store trait used by the admission gate.

use crate::error::TiergateError;
use crate::types::BudgetStatus;

/// Shared spend counter with reservations.
///
/// Implementations hold all counters under a single lock so that the check
/// and the reservation happen atomically. None of the methods suspend.
pub trait BudgetStore: Send + Sync + 'static {
    /// Admit a call of `estimate_usd` if `spent + reserved + estimate` stays
    /// within every ceiling, and reserve the estimate.
    ///
    /// Returns [`TiergateError::BudgetExceeded`] without reserving otherwise.
    fn check_and_reserve(&self, estimate_usd: f64) -> Result<(), TiergateError>;

    /// Replace a reservation with the measured cost of the call.
    fn commit(&self, estimate_usd: f64, actual_usd: f64);

    /// Drop a reservation for a call that never reached the provider.
    fn release(&self, estimate_usd: f64);

    /// Count one billed request against the period. Called once per request,
    /// however many provider calls it made.
    fn record_request(&self);

    /// Snapshot of the current period counters.
    fn status(&self) -> BudgetStatus;
}
