// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured results of routed requests and the sinks that receive them.
//!
//! The engine assembles a [`RoutingResult`] (or a [`RoutingFailure`]) and
//! hands it to every configured [`OutcomeSink`]. Sinks never block the
//! request path: [`TracingSink`] emits one event, [`LedgerSink`] queues the
//! charged stages and a request log row for a background SQLite writer.
//! A provider call abandoned because the route future was dropped reaches
//! the sinks as an [`AbandonedCall`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use thiserror::Error;
use tiergate_core::{ProviderFailureKind, Tier, TiergateError, TokenUsage};
use tiergate_cost::{
    CostLedger, CostRecord, LedgerStage, ModelPricing, RequestLogEntry, calculate_cost,
};
use tiergate_router::ScoreBreakdown;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One provider call made for a request: Stage A or Stage B.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: LedgerStage,
    pub tier: Tier,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
    /// Reported usage, or an estimate for streams that sent none.
    pub usage: TokenUsage,
    /// Amount committed to the budget for this call.
    pub cost_usd: f64,
    /// Provider output before the self-evaluation line was removed.
    pub raw_text: String,
    pub confidence: Option<f64>,
    pub escalate_recommended: bool,
    /// Set when the call failed at the provider.
    pub failure_kind: Option<ProviderFailureKind>,
    pub error: Option<String>,
    pub retries: u32,
}

impl StageReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Why a recommended escalation did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscalationSkip {
    /// The budget refused the Stage B reservation.
    Budget,
}

/// Outcome of a successfully routed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingResult {
    pub request_id: String,
    pub caller: String,
    pub created_at: DateTime<Utc>,
    /// Final answer: Stage B output if it ran, else Stage A's answer.
    pub text: String,
    pub initial_tier: Tier,
    pub initial_model: String,
    pub escalated_tier: Option<Tier>,
    pub escalated_model: Option<String>,
    pub escalated: bool,
    pub escalation_skipped: Option<EscalationSkip>,
    /// Stage A self-reported confidence, when one was requested and parsed.
    pub confidence: Option<f64>,
    pub streamed: bool,
    /// The caller pinned the tier; scoring did not choose it.
    pub forced: bool,
    pub breakdown: ScoreBreakdown,
    pub stages: Vec<StageReport>,
    pub cost_usd: f64,
    /// What the same token counts would have cost on the highest tier.
    pub baseline_cost_usd: f64,
    pub cost_saved_usd: f64,
    pub latency_ms: u64,
}

impl RoutingResult {
    /// Tier that produced the final text.
    pub fn final_tier(&self) -> Tier {
        self.escalated_tier
            .filter(|_| self.escalated)
            .unwrap_or(self.initial_tier)
    }

    pub fn usage(&self) -> TokenUsage {
        total_usage(&self.stages)
    }

    pub fn stage(&self, stage: LedgerStage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn total_retries(&self) -> u32 {
        self.stages.iter().map(|s| s.retries).sum()
    }
}

/// Failure of a routed request, with whatever was learned before it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RoutingFailure {
    pub request_id: String,
    pub caller: String,
    pub error: TiergateError,
    /// Present when the request got as far as scoring.
    pub breakdown: Option<ScoreBreakdown>,
    /// Stages attempted before the failure, including the failed one.
    pub stages: Vec<StageReport>,
    /// Retries consumed across all stages.
    pub retries: u32,
    pub forced: bool,
    pub streamed: bool,
    pub created_at: DateTime<Utc>,
    pub latency_ms: u64,
}

impl RoutingFailure {
    pub fn status_code(&self) -> u16 {
        self.error.status_code()
    }
}

/// A provider call in flight when its request was dropped.
///
/// The call may already have been billed, so its estimate is committed to
/// the budget and reported here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbandonedCall {
    pub request_id: String,
    pub stage: LedgerStage,
    pub tier: Tier,
    pub model: String,
    /// Usage the estimate was priced from.
    pub estimated_usage: TokenUsage,
    /// Amount committed to the budget.
    pub cost_usd: f64,
}

/// Cost of the recorded usage had every stage run at `baseline` prices.
pub fn baseline_cost_usd(stages: &[StageReport], baseline: &ModelPricing) -> f64 {
    stages
        .iter()
        .filter(|s| s.succeeded())
        .map(|s| calculate_cost(&s.usage, baseline))
        .sum()
}

/// Savings relative to the baseline, never negative.
pub fn cost_saved_usd(baseline_usd: f64, actual_usd: f64) -> f64 {
    (baseline_usd - actual_usd).max(0.0)
}

/// Receiver of routing outcomes. Implementations must not block.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, result: &RoutingResult);

    /// Called for failed requests; completed stages may still carry cost.
    fn record_failure(&self, _failure: &RoutingFailure) {}

    /// Called when a request is dropped mid-call. Runs inside `Drop`.
    fn record_abandoned(&self, _call: &AbandonedCall) {}
}

/// Emits one structured event per routed request on target `tiergate::outcome`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutcomeSink for TracingSink {
    fn record(&self, result: &RoutingResult) {
        let usage = result.usage();
        info!(
            target: "tiergate::outcome",
            request_id = %result.request_id,
            caller = %result.caller,
            score = result.breakdown.score,
            hard_triggered = result.breakdown.hard_triggered,
            initial_tier = %result.initial_tier,
            final_tier = %result.final_tier(),
            escalated = result.escalated,
            escalation_skipped = ?result.escalation_skipped,
            confidence = ?result.confidence,
            streamed = result.streamed,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost_usd = result.cost_usd,
            cost_saved_usd = result.cost_saved_usd,
            retries = result.total_retries(),
            latency_ms = result.latency_ms,
            "request routed"
        );
    }

    fn record_failure(&self, failure: &RoutingFailure) {
        warn!(
            target: "tiergate::outcome",
            request_id = %failure.request_id,
            caller = %failure.caller,
            error_kind = failure.error.kind_label(),
            status = failure.status_code(),
            score = ?failure.breakdown.as_ref().map(|b| b.score),
            stages = failure.stages.len(),
            retries = failure.retries,
            error = %failure.error,
            "request failed"
        );
    }

    fn record_abandoned(&self, call: &AbandonedCall) {
        warn!(
            target: "tiergate::outcome",
            request_id = %call.request_id,
            stage = %call.stage,
            model = %call.model,
            cost_usd = call.cost_usd,
            "request dropped mid-call, estimate charged"
        );
    }
}

fn total_usage(stages: &[StageReport]) -> TokenUsage {
    stages.iter().fold(TokenUsage::default(), |acc, s| TokenUsage {
        input_tokens: acc.input_tokens.saturating_add(s.usage.input_tokens),
        output_tokens: acc.output_tokens.saturating_add(s.usage.output_tokens),
    })
}

fn stage_count(stages: &[StageReport]) -> u32 {
    u32::try_from(stages.len()).unwrap_or(u32::MAX)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

impl From<&RoutingResult> for RequestLogEntry {
    fn from(result: &RoutingResult) -> Self {
        let usage = result.usage();
        let final_model = result
            .escalated_model
            .clone()
            .filter(|_| result.escalated)
            .unwrap_or_else(|| result.initial_model.clone());
        Self {
            request_id: result.request_id.clone(),
            caller: result.caller.clone(),
            success: true,
            status_code: 200,
            error_kind: None,
            error: None,
            score: Some(result.breakdown.score),
            initial_tier: Some(result.initial_tier),
            final_tier: Some(result.final_tier()),
            final_model: Some(final_model),
            escalated: result.escalated,
            forced: result.forced,
            streamed: result.streamed,
            stage_count: stage_count(&result.stages),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd: result.cost_usd,
            latency_ms: result.latency_ms,
            created_at: timestamp(result.created_at),
        }
    }
}

impl From<&RoutingFailure> for RequestLogEntry {
    fn from(failure: &RoutingFailure) -> Self {
        let usage = total_usage(&failure.stages);
        let last = failure.stages.last();
        Self {
            request_id: failure.request_id.clone(),
            caller: failure.caller.clone(),
            success: false,
            status_code: failure.status_code(),
            error_kind: Some(failure.error.kind_label().to_string()),
            error: Some(failure.error.to_string()),
            score: failure.breakdown.as_ref().map(|b| b.score),
            initial_tier: failure.stages.first().map(|s| s.tier),
            final_tier: last.map(|s| s.tier),
            final_model: last.map(|s| s.model.clone()),
            escalated: failure
                .stages
                .iter()
                .any(|s| s.stage == LedgerStage::StageB),
            forced: failure.forced,
            streamed: failure.streamed,
            stage_count: stage_count(&failure.stages),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd: failure.stages.iter().map(|s| s.cost_usd).sum(),
            latency_ms: failure.latency_ms,
            created_at: timestamp(failure.created_at),
        }
    }
}

/// Default queue depth between the request path and the ledger writer.
pub const LEDGER_QUEUE_CAPACITY: usize = 1024;

/// A row bound for the ledger database.
#[derive(Debug)]
enum LedgerEntry {
    Cost(CostRecord),
    Request(Box<RequestLogEntry>),
}

/// Appends every charged stage to the SQLite cost ledger and one row per
/// request to the request log.
///
/// Rows go through a bounded channel; a full channel drops the row with a
/// warning rather than stall the request.
#[derive(Debug, Clone)]
pub struct LedgerSink {
    tx: mpsc::Sender<LedgerEntry>,
}

impl LedgerSink {
    /// Spawn the background writer. It exits once every sink clone is dropped
    /// and the queue has drained.
    pub fn spawn(ledger: CostLedger, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<LedgerEntry>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let (written, request_id) = match &entry {
                    LedgerEntry::Cost(record) => (ledger.record(record).await, &record.request_id),
                    LedgerEntry::Request(row) => (ledger.log_request(row).await, &row.request_id),
                };
                if let Err(e) = written {
                    warn!(error = %e, request_id = %request_id, "failed to persist ledger row");
                }
            }
        });
        (Self { tx }, handle)
    }

    fn send(&self, entry: LedgerEntry, request_id: &str) {
        if let Err(e) = self.tx.try_send(entry) {
            warn!(error = %e, request_id, "ledger queue unavailable, row dropped");
        }
    }

    fn enqueue(&self, request_id: &str, stages: &[StageReport]) {
        for stage in stages.iter().filter(|s| s.cost_usd > 0.0) {
            let record = CostRecord::new(
                request_id.to_string(),
                stage.stage,
                stage.tier,
                stage.model.clone(),
                &stage.usage,
                stage.cost_usd,
            );
            self.send(LedgerEntry::Cost(record), request_id);
        }
    }
}

impl OutcomeSink for LedgerSink {
    fn record(&self, result: &RoutingResult) {
        self.enqueue(&result.request_id, &result.stages);
        self.send(
            LedgerEntry::Request(Box::new(result.into())),
            &result.request_id,
        );
    }

    fn record_failure(&self, failure: &RoutingFailure) {
        self.enqueue(&failure.request_id, &failure.stages);
        self.send(
            LedgerEntry::Request(Box::new(failure.into())),
            &failure.request_id,
        );
    }

    fn record_abandoned(&self, call: &AbandonedCall) {
        if call.cost_usd <= 0.0 {
            return;
        }
        let record = CostRecord::new(
            call.request_id.clone(),
            call.stage,
            call.tier,
            call.model.clone(),
            &call.estimated_usage,
            call.cost_usd,
        );
        self.send(LedgerEntry::Cost(record), &call.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn stage(stage: LedgerStage, tier: Tier, usage: TokenUsage, cost: f64) -> StageReport {
        let now = Utc::now();
        StageReport {
            stage,
            tier,
            model: format!("{tier}-model"),
            started_at: now,
            finished_at: now,
            latency_ms: 5,
            usage,
            cost_usd: cost,
            raw_text: "answer".into(),
            confidence: None,
            escalate_recommended: false,
            failure_kind: None,
            error: None,
            retries: 0,
        }
    }

    fn failure(error: TiergateError, stages: Vec<StageReport>) -> RoutingFailure {
        RoutingFailure {
            request_id: "req-9".into(),
            caller: "t".into(),
            error,
            breakdown: None,
            retries: 0,
            stages,
            forced: false,
            streamed: false,
            created_at: Utc::now(),
            latency_ms: 40,
        }
    }

    #[test]
    fn baseline_uses_highest_prices() {
        let high = ModelPricing::new(15.0, 60.0);
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 0,
        };
        let stages = vec![stage(LedgerStage::StageA, Tier::Low, usage, 0.15)];
        let baseline = baseline_cost_usd(&stages, &high);
        assert!((baseline - 15.0).abs() < 1e-9);
        assert!((cost_saved_usd(baseline, 0.15) - 14.85).abs() < 1e-9);
    }

    #[test]
    fn savings_never_negative() {
        assert_eq!(cost_saved_usd(1.0, 2.0), 0.0);
    }

    #[test]
    fn failed_stages_are_excluded_from_baseline() {
        let high = ModelPricing::new(15.0, 60.0);
        let mut failed = stage(LedgerStage::StageA, Tier::Low, TokenUsage::default(), 0.0);
        failed.error = Some("boom".into());
        failed.usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 100,
        };
        assert_eq!(baseline_cost_usd(&[failed], &high), 0.0);
    }

    #[tokio::test]
    async fn ledger_sink_persists_charged_stages() {
        let ledger = CostLedger::open_in_memory().await.unwrap();
        let (sink, handle) = LedgerSink::spawn(ledger.clone(), 8);

        let usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 20,
        };
        let failure = failure(
            TiergateError::Cancelled,
            vec![
                stage(LedgerStage::StageA, Tier::Low, usage, 0.25),
                stage(LedgerStage::StageB, Tier::Mid, TokenUsage::default(), 0.0),
            ],
        );
        sink.record_failure(&failure);
        drop(sink);
        handle.await.unwrap();

        let total = ledger.request_total("req-9").await.unwrap();
        assert!((total - 0.25).abs() < 1e-12);

        let rows = ledger.recent_requests(5).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert!(!row.success);
        assert_eq!(row.status_code, failure.status_code());
        assert_eq!(row.error_kind.as_deref(), Some(failure.error.kind_label()));
        assert_eq!(row.initial_tier, Some(Tier::Low));
        assert_eq!(row.final_tier, Some(Tier::Mid));
        assert!(row.escalated);
        assert_eq!(row.stage_count, 2);
        assert_eq!(row.latency_ms, 40);
    }

    #[tokio::test]
    async fn abandoned_calls_reach_the_ledger() {
        let ledger = CostLedger::open_in_memory().await.unwrap();
        let (sink, handle) = LedgerSink::spawn(ledger.clone(), 8);

        sink.record_abandoned(&AbandonedCall {
            request_id: "req-gone".into(),
            stage: LedgerStage::StageA,
            tier: Tier::High,
            model: "o1".into(),
            estimated_usage: TokenUsage {
                input_tokens: 50,
                output_tokens: 1000,
            },
            cost_usd: 0.4,
        });
        drop(sink);
        handle.await.unwrap();

        let total = ledger.request_total("req-gone").await.unwrap();
        assert!((total - 0.4).abs() < 1e-12);
        // No outcome was reached, so no request row.
        assert!(ledger.recent_requests(5).await.unwrap().is_empty());
    }

    #[test]
    fn failure_exposes_status_code() {
        let failure = failure(
            TiergateError::Validation {
                message: "empty".into(),
            },
            vec![],
        );
        assert_eq!(failure.status_code(), 400);
        assert_eq!(failure.to_string(), "invalid request: empty");
    }
}
