// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission gate: rate check and budget reservation ahead of provider calls.

use std::sync::Arc;

use tiergate_core::{BudgetStatus, BudgetStore, TiergateError};
use tracing::debug;

use crate::outcome::{AbandonedCall, OutcomeSink};
use crate::ratelimit::{EndpointClass, RateLimiter};

/// Combines the rate limiter and the budget store.
pub struct AdmissionGate {
    limiter: Arc<RateLimiter>,
    budget: Arc<dyn BudgetStore>,
}

impl AdmissionGate {
    pub fn new(limiter: Arc<RateLimiter>, budget: Arc<dyn BudgetStore>) -> Self {
        Self { limiter, budget }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Rate check for one caller and endpoint class.
    pub fn check_rate(&self, caller: &str, class: EndpointClass) -> Result<(), TiergateError> {
        self.limiter.check(caller, class)
    }

    /// Reserve `estimate_usd` against the budget.
    ///
    /// The returned guard must be settled with [`Reservation::commit`] or
    /// [`Reservation::release`]. A guard dropped unsettled commits its
    /// estimate: the call may have reached the provider and been billed.
    pub fn reserve(&self, estimate_usd: f64) -> Result<Reservation, TiergateError> {
        self.budget.check_and_reserve(estimate_usd)?;
        debug!(estimate_usd, "budget reserved");
        Ok(Reservation {
            budget: Arc::clone(&self.budget),
            estimate_usd,
            counts_request: false,
            abandon: None,
            settled: false,
        })
    }

    /// Reserve for the first call of a request. Once the call is committed,
    /// the request counts toward the period's request total.
    pub fn reserve_request(&self, estimate_usd: f64) -> Result<Reservation, TiergateError> {
        let mut reservation = self.reserve(estimate_usd)?;
        reservation.counts_request = true;
        Ok(reservation)
    }

    pub fn budget_status(&self) -> BudgetStatus {
        self.budget.status()
    }
}

/// An outstanding budget reservation for one provider call.
#[must_use = "an unsettled reservation is committed at its estimate"]
pub struct Reservation {
    budget: Arc<dyn BudgetStore>,
    estimate_usd: f64,
    counts_request: bool,
    abandon: Option<AbandonNotice>,
    settled: bool,
}

/// Who to tell when a reservation is dropped unsettled.
struct AbandonNotice {
    call: AbandonedCall,
    sinks: Vec<Arc<dyn OutcomeSink>>,
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("estimate_usd", &self.estimate_usd)
            .field("counts_request", &self.counts_request)
            .field("settled", &self.settled)
            .finish()
    }
}

impl Reservation {
    pub fn estimate_usd(&self) -> f64 {
        self.estimate_usd
    }

    /// Report `call` to `sinks` if this reservation is dropped unsettled.
    pub fn on_abandon(mut self, call: AbandonedCall, sinks: &[Arc<dyn OutcomeSink>]) -> Self {
        self.abandon = Some(AbandonNotice {
            call,
            sinks: sinks.to_vec(),
        });
        self
    }

    /// Replace the reservation with the measured cost.
    pub fn commit(mut self, actual_usd: f64) {
        self.settle_at(actual_usd);
    }

    fn settle_at(&mut self, actual_usd: f64) {
        self.settled = true;
        self.budget.commit(self.estimate_usd, actual_usd);
        if self.counts_request {
            self.budget.record_request();
        }
    }

    /// Commit the estimate itself, for calls abandoned in flight.
    pub fn commit_estimate(self) {
        let estimate = self.estimate_usd;
        self.commit(estimate);
    }

    /// Drop the reservation; the call never produced billable work.
    pub fn release(mut self) {
        self.settled = true;
        self.budget.release(self.estimate_usd);
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        debug!(
            estimate_usd = self.estimate_usd,
            "reservation dropped unsettled, committing estimate"
        );
        self.settle_at(self.estimate_usd);
        if let Some(notice) = self.abandon.take() {
            for sink in &notice.sinks {
                sink.record_abandoned(&notice.call);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tiergate_config::model::CostConfig;
    use tiergate_cost::BudgetTracker;

    use super::*;

    fn gate(monthly: f64) -> (AdmissionGate, Arc<BudgetTracker>) {
        let tracker = Arc::new(BudgetTracker::new(&CostConfig {
            monthly_budget_usd: Some(monthly),
            daily_budget_usd: None,
            ledger_enabled: false,
        }));
        let gate = AdmissionGate::new(Arc::new(RateLimiter::disabled()), tracker.clone());
        (gate, tracker)
    }

    #[test]
    fn commit_replaces_estimate_with_actual() {
        let (gate, tracker) = gate(1.0);
        let r = gate.reserve(0.5).unwrap();
        assert!((tracker.status().reserved_usd - 0.5).abs() < 1e-12);
        r.commit(0.1);
        let status = tracker.status();
        assert!(status.reserved_usd.abs() < 1e-12);
        assert!((status.spent_usd - 0.1).abs() < 1e-12);
    }

    #[test]
    fn release_refunds_everything() {
        let (gate, tracker) = gate(1.0);
        gate.reserve(0.5).unwrap().release();
        let status = tracker.status();
        assert!(status.reserved_usd.abs() < 1e-12);
        assert!(status.spent_usd.abs() < 1e-12);
    }

    #[test]
    fn dropped_reservation_commits_estimate() {
        let (gate, tracker) = gate(1.0);
        {
            let _r = gate.reserve(0.3).unwrap();
        }
        let status = tracker.status();
        assert!(status.reserved_usd.abs() < 1e-12);
        assert!((status.spent_usd - 0.3).abs() < 1e-12);
    }

    #[test]
    fn only_request_reservations_count_requests() {
        let (gate, tracker) = gate(1.0);
        gate.reserve_request(0.2).unwrap().commit(0.1);
        gate.reserve(0.2).unwrap().commit(0.1);
        gate.reserve_request(0.2).unwrap().release();
        assert_eq!(tracker.status().request_count, 1);

        {
            let _dropped = gate.reserve_request(0.2).unwrap();
        }
        assert_eq!(tracker.status().request_count, 2);
    }

    #[derive(Default)]
    struct Abandoned(std::sync::Mutex<Vec<AbandonedCall>>);

    impl OutcomeSink for Abandoned {
        fn record(&self, _result: &crate::RoutingResult) {}

        fn record_abandoned(&self, call: &AbandonedCall) {
            self.0.lock().unwrap().push(call.clone());
        }
    }

    fn abandoned_call(cost_usd: f64) -> AbandonedCall {
        AbandonedCall {
            request_id: "req-1".into(),
            stage: tiergate_cost::LedgerStage::StageA,
            tier: tiergate_core::Tier::Low,
            model: "gpt-4o-mini".into(),
            estimated_usage: tiergate_core::TokenUsage::default(),
            cost_usd,
        }
    }

    #[test]
    fn dropped_reservation_notifies_sinks() {
        let (gate, _) = gate(1.0);
        let sink = Arc::new(Abandoned::default());
        let sinks: Vec<Arc<dyn OutcomeSink>> = vec![sink.clone()];

        drop(gate.reserve(0.3).unwrap().on_abandon(abandoned_call(0.3), &sinks));
        gate.reserve(0.3)
            .unwrap()
            .on_abandon(abandoned_call(0.3), &sinks)
            .commit(0.1);

        let calls = sink.0.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].request_id, "req-1");
    }

    #[test]
    fn reservations_count_against_the_ceiling() {
        let (gate, _) = gate(1.0);
        let _a = gate.reserve(0.6).unwrap();
        let err = gate.reserve(0.6).unwrap_err();
        assert_eq!(err.status_code(), 402);
    }
}
