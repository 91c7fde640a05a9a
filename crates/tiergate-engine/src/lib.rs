// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request execution for tiergate.
//!
//! [`RoutingEngine::route`] takes a request through input validation,
//! scoring, the per-caller rate limit, and the two-stage orchestrator, and
//! hands the outcome to every [`OutcomeSink`]. Each provider call is admitted
//! by a budget [`Reservation`] and settled at its measured cost.

pub mod admission;
pub mod engine;
pub mod input;
pub mod orchestrator;
pub mod outcome;
pub mod ratelimit;

pub use admission::{AdmissionGate, Reservation};
pub use engine::{ANONYMOUS_CALLER, RouteRequest, RoutingEngine};
pub use input::{InputLimits, ValidatedInput, sanitize};
pub use orchestrator::{Execution, ExecutionContext, ExecutionError, Orchestrator};
pub use outcome::{
    AbandonedCall, EscalationSkip, LEDGER_QUEUE_CAPACITY, LedgerSink, OutcomeSink, RoutingFailure,
    RoutingResult, StageReport, TracingSink, baseline_cost_usd, cost_saved_usd,
};
pub use ratelimit::{EndpointClass, RateLimiter};
