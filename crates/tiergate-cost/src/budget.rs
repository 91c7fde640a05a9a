// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Budget tracking with monthly and daily ceilings.
//!
//! The tracker keeps in-memory running totals plus the estimates reserved by
//! in-flight calls, all under one mutex. A call is admitted only if
//! `spent + reserved + estimate` stays within every ceiling; the estimate is
//! then reserved until [`BudgetStore::commit`] or [`BudgetStore::release`].
//! It emits a `tracing::warn` at 80% of any ceiling.
//!
//! On restart, `from_ledger()` re-hydrates totals from the persistent cost
//! ledger so budget enforcement survives process restarts.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tiergate_config::model::CostConfig;
use tiergate_core::{BudgetStatus, BudgetStore, TiergateError};
use tracing::{debug, warn};

use crate::ledger::CostLedger;

/// Slack for float accumulation when comparing against a ceiling.
const CEILING_EPSILON: f64 = 1e-9;

/// Fraction of a ceiling at which a warning is logged.
const WARN_FRACTION: f64 = 0.8;

#[derive(Debug)]
struct Counters {
    monthly_spent_usd: f64,
    daily_spent_usd: f64,
    reserved_usd: f64,
    /// Billed requests this month; escalation does not count twice.
    request_count: u64,
    /// Calendar day the daily total belongs to.
    day: NaiveDate,
    /// (year, month) the monthly total belongs to.
    month: (i32, u32),
}

impl Counters {
    fn roll(&mut self, now: DateTime<Utc>) {
        let day = now.date_naive();
        if day != self.day {
            self.daily_spent_usd = 0.0;
            self.day = day;
        }
        let month = (now.year(), now.month());
        if month != self.month {
            debug!(
                previous = self.monthly_spent_usd,
                "budget period rolled over"
            );
            self.monthly_spent_usd = 0.0;
            self.request_count = 0;
            self.month = month;
        }
    }
}

/// In-memory budget tracker with monthly and daily ceilings and reservations.
pub struct BudgetTracker {
    monthly_cap: Option<f64>,
    daily_cap: Option<f64>,
    counters: Mutex<Counters>,
}

impl BudgetTracker {
    /// Create a new budget tracker with zero totals.
    pub fn new(config: &CostConfig) -> Self {
        Self::with_totals(config, 0.0, 0.0, 0, Utc::now())
    }

    /// Create a budget tracker initialized from existing ledger data.
    ///
    /// Queries the ledger for today's and this month's totals so budget
    /// enforcement is continuous across restarts.
    pub async fn from_ledger(
        config: &CostConfig,
        ledger: &CostLedger,
    ) -> Result<Self, TiergateError> {
        let now = Utc::now();
        let today = now.format("%Y-%m-%d").to_string();
        let year_month = now.format("%Y-%m").to_string();

        let daily_total = ledger.daily_total(&today).await?;
        let (monthly_total, request_count) = ledger.monthly_totals(&year_month).await?;

        Ok(Self::with_totals(
            config,
            monthly_total,
            daily_total,
            request_count,
            now,
        ))
    }

    fn with_totals(
        config: &CostConfig,
        monthly_spent_usd: f64,
        daily_spent_usd: f64,
        request_count: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            monthly_cap: config.monthly_budget_usd,
            daily_cap: config.daily_budget_usd,
            counters: Mutex::new(Counters {
                monthly_spent_usd,
                daily_spent_usd,
                reserved_usd: 0.0,
                request_count,
                day: now.date_naive(),
                month: (now.year(), now.month()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        // Counter updates are single float additions; a panic elsewhere
        // cannot leave them half-written.
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_and_reserve_at(&self, estimate_usd: f64, now: DateTime<Utc>) -> Result<(), TiergateError> {
        let estimate_usd = estimate_usd.max(0.0);
        let mut c = self.lock();
        c.roll(now);

        if let Some(cap) = self.monthly_cap {
            let committed = c.monthly_spent_usd + c.reserved_usd;
            if committed + estimate_usd > cap + CEILING_EPSILON {
                return Err(TiergateError::BudgetExceeded {
                    message: format!(
                        "monthly budget of ${cap:.2} would be exceeded \
                         (spent ${:.4}, reserved ${:.4}, estimate ${estimate_usd:.4})",
                        c.monthly_spent_usd, c.reserved_usd
                    ),
                });
            }
        }
        if let Some(cap) = self.daily_cap {
            let committed = c.daily_spent_usd + c.reserved_usd;
            if committed + estimate_usd > cap + CEILING_EPSILON {
                return Err(TiergateError::BudgetExceeded {
                    message: format!(
                        "daily budget of ${cap:.2} would be exceeded \
                         (spent ${:.4}, reserved ${:.4}, estimate ${estimate_usd:.4}); resumes at midnight UTC",
                        c.daily_spent_usd, c.reserved_usd
                    ),
                });
            }
        }

        c.reserved_usd += estimate_usd;
        Ok(())
    }

    fn commit_at(&self, estimate_usd: f64, actual_usd: f64, now: DateTime<Utc>) {
        let actual_usd = actual_usd.max(0.0);
        let mut c = self.lock();
        c.roll(now);
        c.reserved_usd = settle(c.reserved_usd, estimate_usd);
        c.monthly_spent_usd += actual_usd;
        c.daily_spent_usd += actual_usd;

        if let Some(cap) = self.monthly_cap {
            if cap > 0.0 && c.monthly_spent_usd >= cap * WARN_FRACTION {
                warn!(
                    monthly_total = c.monthly_spent_usd,
                    monthly_cap = cap,
                    "approaching monthly budget cap (80%+)"
                );
            }
        }
        if let Some(cap) = self.daily_cap {
            if cap > 0.0 && c.daily_spent_usd >= cap * WARN_FRACTION {
                warn!(
                    daily_total = c.daily_spent_usd,
                    daily_cap = cap,
                    "approaching daily budget cap (80%+)"
                );
            }
        }
    }

    fn record_request_at(&self, now: DateTime<Utc>) {
        let mut c = self.lock();
        c.roll(now);
        c.request_count += 1;
    }

    fn status_at(&self, now: DateTime<Utc>) -> BudgetStatus {
        let mut c = self.lock();
        c.roll(now);
        let (remaining_usd, percentage_used) = match self.monthly_cap {
            Some(cap) => (
                Some((cap - c.monthly_spent_usd - c.reserved_usd).max(0.0)),
                if cap > 0.0 {
                    c.monthly_spent_usd / cap * 100.0
                } else {
                    0.0
                },
            ),
            None => (None, 0.0),
        };
        BudgetStatus {
            period: format!("{:04}-{:02}", c.month.0, c.month.1),
            monthly_limit_usd: self.monthly_cap,
            spent_usd: c.monthly_spent_usd,
            reserved_usd: c.reserved_usd,
            remaining_usd,
            percentage_used,
            request_count: c.request_count,
            daily_spent_usd: c.daily_spent_usd,
            daily_limit_usd: self.daily_cap,
        }
    }
}

/// Remove a reservation, snapping float residue to zero.
fn settle(reserved: f64, estimate: f64) -> f64 {
    let left = reserved - estimate.max(0.0);
    if left < CEILING_EPSILON { 0.0 } else { left }
}

impl BudgetStore for BudgetTracker {
    fn check_and_reserve(&self, estimate_usd: f64) -> Result<(), TiergateError> {
        self.check_and_reserve_at(estimate_usd, Utc::now())
    }

    fn commit(&self, estimate_usd: f64, actual_usd: f64) {
        self.commit_at(estimate_usd, actual_usd, Utc::now());
    }

    fn release(&self, estimate_usd: f64) {
        let mut c = self.lock();
        c.reserved_usd = settle(c.reserved_usd, estimate_usd);
    }

    fn record_request(&self) {
        self.record_request_at(Utc::now());
    }

    fn status(&self) -> BudgetStatus {
        self.status_at(Utc::now())
    }
}
