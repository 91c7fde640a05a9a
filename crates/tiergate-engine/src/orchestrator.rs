// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Two-stage execution of a routed request.
//!
//! ```text
//! StageA ──> EscalationDecision ──> StageB ──> Done
//!   │                  │                          ^
//!   └──────────────────┴──────────────────────────┘
//! ```
//!
//! Stage A runs at the selected tier. When that tier asks for a
//! self-evaluation, the reply is parsed and Stage B runs one tier up if the
//! model recommends it or reports confidence below the threshold. Streaming
//! and forced-tier requests run Stage A only. Every provider call holds its own budget
//! reservation and runs under the retry policy, the caller's cancellation
//! token, and the request deadline.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tiergate_core::{
    ProviderAdapter, ProviderRequest, StreamEventType, TiergateError, TokenUsage,
};
use tiergate_cost::{LedgerStage, calculate_cost, estimate_input_tokens, estimate_output_tokens};
use tiergate_resilience::RetryPolicy;
use tiergate_router::{
    Analysis, ParsedReply, SELF_EVAL_INSTRUCTION, SelfEvaluation, TierCatalog, TierDefinition,
    parse_reply, router_context,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::admission::{AdmissionGate, Reservation};
use crate::outcome::{AbandonedCall, EscalationSkip, OutcomeSink, StageReport};

/// Everything the orchestrator needs to know about one request.
pub struct ExecutionContext<'a> {
    pub request_id: &'a str,
    pub text: &'a str,
    pub analysis: &'a Analysis,
    pub catalog: &'a TierCatalog,
    pub max_output_tokens: u32,
    pub cancel: &'a CancellationToken,
    pub deadline: Instant,
    pub timeout: Duration,
    /// Run Stage A as a stream; never escalates.
    pub streaming: bool,
    /// Receives each text delta of a streaming request.
    pub deltas: Option<&'a mpsc::Sender<String>>,
    /// The caller pinned the tier: Stage A only, no self-evaluation.
    pub forced: bool,
    /// Told about calls abandoned when the request is dropped.
    pub sinks: &'a [Arc<dyn OutcomeSink>],
}

/// A completed execution.
#[derive(Debug)]
pub struct Execution {
    pub text: String,
    pub stages: Vec<StageReport>,
    pub evaluation: Option<SelfEvaluation>,
    pub escalated: bool,
    pub escalation_skipped: Option<EscalationSkip>,
}

/// A failed execution and the stages attempted before it failed.
#[derive(Debug)]
pub struct ExecutionError {
    pub error: TiergateError,
    pub stages: Vec<StageReport>,
}

enum State {
    StageA,
    EscalationDecision { raw: String },
    StageB { fallback: String },
    Done { text: String },
}

/// Drives the state machine for one request at a time; shared by all
/// requests of an engine.
pub struct Orchestrator {
    provider: Arc<dyn ProviderAdapter>,
    gate: Arc<AdmissionGate>,
    retry: RetryPolicy,
    confidence_threshold: f64,
}

/// A prepared provider call.
struct StageCall<'d> {
    stage: LedgerStage,
    definition: &'d TierDefinition,
    request: ProviderRequest,
    estimated_input_tokens: u32,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        gate: Arc<AdmissionGate>,
        retry: RetryPolicy,
        confidence_threshold: f64,
    ) -> Self {
        Self {
            provider,
            gate,
            retry,
            confidence_threshold,
        }
    }

    pub async fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<Execution, ExecutionError> {
        let mut stages: Vec<StageReport> = Vec::with_capacity(2);
        let mut evaluation: Option<SelfEvaluation> = None;
        let mut escalated = false;
        let mut escalation_skipped = None;
        let initial = ctx.catalog.definition(ctx.analysis.tier);
        let streaming = ctx.streaming;

        let mut state = State::StageA;
        loop {
            state = match state {
                State::StageA => {
                    // Streaming and forced requests commit to the initial tier.
                    let self_eval = initial.self_eval_enabled && !streaming && !ctx.forced;
                    let system = self_eval.then(|| SELF_EVAL_INSTRUCTION.to_string());
                    let call = self.prepare(ctx, LedgerStage::StageA, initial, system);
                    let estimate = self.estimate(&call, ctx);
                    let reservation = self
                        .gate
                        .reserve_request(estimate)
                        .map_err(|error| ExecutionError {
                            error,
                            stages: Vec::new(),
                        })?
                        .on_abandon(abandoned(ctx, &call, estimate), ctx.sinks);

                    let raw = if streaming {
                        self.call_streaming(ctx, call, reservation, &mut stages).await
                    } else {
                        self.call_buffered(ctx, call, reservation, &mut stages).await
                    };
                    let raw = match raw {
                        Ok(raw) => raw,
                        Err(error) => return Err(ExecutionError { error, stages }),
                    };

                    if self_eval {
                        State::EscalationDecision { raw }
                    } else {
                        State::Done {
                            text: raw.trim().to_string(),
                        }
                    }
                }

                State::EscalationDecision { raw } => {
                    let ParsedReply {
                        answer,
                        evaluation: parsed,
                    } = parse_reply(&raw);
                    if let (Some(report), Some(eval)) = (stages.last_mut(), parsed.as_ref()) {
                        report.confidence = Some(eval.confidence);
                        report.escalate_recommended = eval.escalate;
                    }

                    let wants = parsed
                        .as_ref()
                        .is_some_and(|e| e.should_escalate(self.confidence_threshold));
                    evaluation = parsed;

                    if wants && ctx.catalog.next(initial.tier).is_some() {
                        State::StageB { fallback: answer }
                    } else {
                        State::Done { text: answer }
                    }
                }

                State::StageB { fallback } => {
                    let Some(next) = ctx.catalog.next(initial.tier) else {
                        return Err(ExecutionError {
                            error: TiergateError::Internal("no tier above the highest".into()),
                            stages,
                        });
                    };
                    let system = router_context(
                        &ctx.analysis.breakdown,
                        &ctx.analysis.features,
                        evaluation.as_ref(),
                    );
                    let call = self.prepare(ctx, LedgerStage::StageB, next, Some(system));
                    let estimate = self.estimate(&call, ctx);

                    match self.gate.reserve(estimate) {
                        Err(TiergateError::BudgetExceeded { message }) => {
                            info!(
                                request_id = ctx.request_id,
                                reason = %message,
                                "escalation skipped: budget refused stage b"
                            );
                            escalation_skipped = Some(EscalationSkip::Budget);
                            State::Done { text: fallback }
                        }
                        Err(error) => return Err(ExecutionError { error, stages }),
                        Ok(reservation) => {
                            let reservation = reservation
                                .on_abandon(abandoned(ctx, &call, estimate), ctx.sinks);
                            info!(
                                request_id = ctx.request_id,
                                from = %initial.tier,
                                to = %next.tier,
                                confidence = ?evaluation.as_ref().map(|e| e.confidence),
                                "escalating"
                            );
                            match self.call_buffered(ctx, call, reservation, &mut stages).await {
                                Ok(raw) => {
                                    escalated = true;
                                    State::Done {
                                        text: raw.trim().to_string(),
                                    }
                                }
                                Err(error) => return Err(ExecutionError { error, stages }),
                            }
                        }
                    }
                }

                State::Done { text } => {
                    return Ok(Execution {
                        text,
                        stages,
                        evaluation,
                        escalated,
                        escalation_skipped,
                    });
                }
            };
        }
    }

    fn prepare<'d>(
        &self,
        ctx: &ExecutionContext<'_>,
        stage: LedgerStage,
        definition: &'d TierDefinition,
        system_prompt: Option<String>,
    ) -> StageCall<'d> {
        let estimated_input_tokens = estimate_input_tokens(system_prompt.as_deref(), ctx.text);
        StageCall {
            stage,
            definition,
            request: ProviderRequest {
                model: definition.model.clone(),
                tier: definition.tier,
                system_prompt,
                text: ctx.text.to_string(),
                max_tokens: ctx.max_output_tokens.min(definition.max_output_tokens),
                stream: ctx.streaming,
            },
            estimated_input_tokens,
        }
    }

    fn estimate(&self, call: &StageCall<'_>, ctx: &ExecutionContext<'_>) -> f64 {
        let estimate = call
            .definition
            .pricing
            .estimate(call.estimated_input_tokens, call.request.max_tokens);
        debug!(
            request_id = ctx.request_id,
            stage = %call.stage,
            model = %call.request.model,
            input_tokens = call.estimated_input_tokens,
            max_tokens = call.request.max_tokens,
            estimate_usd = estimate,
            "stage cost estimated"
        );
        estimate
    }

    /// Buffered provider call under retry, cancellation, and deadline.
    async fn call_buffered(
        &self,
        ctx: &ExecutionContext<'_>,
        call: StageCall<'_>,
        reservation: Reservation,
        stages: &mut Vec<StageReport>,
    ) -> Result<String, TiergateError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let attempt = AtomicU32::new(0);
        let label = call.stage.to_string();

        let provider = &self.provider;
        let request = &call.request;
        let outcome = guard(
            ctx,
            self.retry.run(&label, |n| {
                attempt.store(n, Ordering::Relaxed);
                let request = request.clone();
                async move { provider.complete(request).await }
            }),
        )
        .await;

        let mut report = StageReport {
            stage: call.stage,
            tier: call.definition.tier,
            model: call.definition.model.clone(),
            started_at,
            finished_at: Utc::now(),
            latency_ms: elapsed_ms(clock),
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            raw_text: String::new(),
            confidence: None,
            escalate_recommended: false,
            failure_kind: None,
            error: None,
            retries: attempt.load(Ordering::Relaxed),
        };

        match outcome {
            Ok((response, retries)) => {
                let cost = calculate_cost(&response.usage, &call.definition.pricing);
                reservation.commit(cost);
                debug!(
                    request_id = ctx.request_id,
                    stage = %call.stage,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    cost_usd = cost,
                    retries,
                    "stage completed"
                );
                report.usage = response.usage;
                report.cost_usd = cost;
                report.raw_text = response.content.clone();
                report.retries = retries;
                stages.push(report);
                Ok(response.content)
            }
            Err(error) => {
                report.cost_usd = settle_failed(reservation, &error);
                if let TiergateError::Provider { kind, retries, .. } = &error {
                    report.failure_kind = Some(*kind);
                    report.retries = *retries;
                }
                report.error = Some(error.to_string());
                warn!(
                    request_id = ctx.request_id,
                    stage = %call.stage,
                    error = %error,
                    "stage failed"
                );
                stages.push(report);
                Err(error)
            }
        }
    }

    /// Streaming provider call. Only establishment is retried; once deltas
    /// flow, a failure is terminal.
    async fn call_streaming(
        &self,
        ctx: &ExecutionContext<'_>,
        call: StageCall<'_>,
        reservation: Reservation,
        stages: &mut Vec<StageReport>,
    ) -> Result<String, TiergateError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let attempt = AtomicU32::new(0);
        let label = format!("{}_stream", call.stage);

        let provider = &self.provider;
        let request = &call.request;
        let established = guard(
            ctx,
            self.retry.run(&label, |n| {
                attempt.store(n, Ordering::Relaxed);
                let request = request.clone();
                async move { provider.stream(request).await }
            }),
        )
        .await;

        let mut report = StageReport {
            stage: call.stage,
            tier: call.definition.tier,
            model: call.definition.model.clone(),
            started_at,
            finished_at: Utc::now(),
            latency_ms: elapsed_ms(clock),
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            raw_text: String::new(),
            confidence: None,
            escalate_recommended: false,
            failure_kind: None,
            error: None,
            retries: attempt.load(Ordering::Relaxed),
        };

        let (mut stream, retries) = match established {
            Ok(ok) => ok,
            Err(error) => {
                report.cost_usd = settle_failed(reservation, &error);
                if let TiergateError::Provider { kind, retries, .. } = &error {
                    report.failure_kind = Some(*kind);
                    report.retries = *retries;
                }
                report.error = Some(error.to_string());
                warn!(request_id = ctx.request_id, error = %error, "stream could not be established");
                stages.push(report);
                return Err(error);
            }
        };
        report.retries = retries;

        let mut text = String::new();
        let mut usage: Option<TokenUsage> = None;
        let consumed = guard(ctx, async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                match chunk.event_type {
                    StreamEventType::ContentDelta => {
                        if let Some(delta) = chunk.text {
                            text.push_str(&delta);
                            if let Some(tx) = ctx.deltas {
                                // A departed receiver does not stop assembly.
                                let _ = tx.send(delta).await;
                            }
                        }
                    }
                    StreamEventType::Usage => {
                        if chunk.usage.is_some() {
                            usage = chunk.usage;
                        }
                    }
                    StreamEventType::MessageStop => break,
                }
            }
            Ok::<(), TiergateError>(())
        })
        .await;

        report.finished_at = Utc::now();
        report.latency_ms = elapsed_ms(clock);
        report.raw_text = text.clone();

        match consumed {
            Ok(()) => {
                let usage = usage.unwrap_or_else(|| {
                    debug!(request_id = ctx.request_id, "stream sent no usage, estimating");
                    TokenUsage {
                        input_tokens: call.estimated_input_tokens,
                        output_tokens: estimate_output_tokens(&text),
                    }
                });
                let cost = calculate_cost(&usage, &call.definition.pricing);
                reservation.commit(cost);
                report.usage = usage;
                report.cost_usd = cost;
                stages.push(report);
                Ok(text)
            }
            Err(error) => {
                // The provider already produced output; charge the estimate.
                let error = error.with_retries(retries);
                report.cost_usd = reservation.estimate_usd();
                reservation.commit_estimate();
                if let TiergateError::Provider { kind, .. } = &error {
                    report.failure_kind = Some(*kind);
                }
                report.error = Some(error.to_string());
                warn!(request_id = ctx.request_id, error = %error, "stream failed mid-response");
                stages.push(report);
                Err(error)
            }
        }
    }
}

/// What to report if the call's reservation is dropped in flight.
fn abandoned(ctx: &ExecutionContext<'_>, call: &StageCall<'_>, estimate: f64) -> AbandonedCall {
    AbandonedCall {
        request_id: ctx.request_id.to_string(),
        stage: call.stage,
        tier: call.definition.tier,
        model: call.definition.model.clone(),
        estimated_usage: TokenUsage {
            input_tokens: call.estimated_input_tokens,
            output_tokens: call.request.max_tokens,
        },
        cost_usd: estimate,
    }
}

/// Race `fut` against the caller's cancellation and the request deadline.
/// A losing `fut` is dropped, abandoning any in-flight provider call.
async fn guard<T>(
    ctx: &ExecutionContext<'_>,
    fut: impl Future<Output = Result<T, TiergateError>>,
) -> Result<T, TiergateError> {
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(TiergateError::Cancelled),
        _ = tokio::time::sleep_until(ctx.deadline) => Err(TiergateError::Timeout { duration: ctx.timeout }),
        result = fut => result,
    }
}

/// Settle the reservation of a call that did not complete. Returns the
/// amount committed.
fn settle_failed(reservation: Reservation, error: &TiergateError) -> f64 {
    match error {
        // Abandoned in flight: the provider may have billed the call.
        TiergateError::Cancelled | TiergateError::Timeout { .. } => {
            let estimate = reservation.estimate_usd();
            reservation.commit_estimate();
            estimate
        }
        _ => {
            reservation.release();
            0.0
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
