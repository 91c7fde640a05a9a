// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The routing engine: validation, scoring, admission, execution, recording.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tiergate_config::model::TiergateConfig;
use tiergate_core::{BudgetStatus, BudgetStore, ProviderAdapter, Tier, TiergateError};
use tiergate_cost::LedgerStage;
use tiergate_resilience::RetryPolicy;
use tiergate_router::{Analysis, Router};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::admission::AdmissionGate;
use crate::input::{InputLimits, sanitize};
use crate::orchestrator::{ExecutionContext, ExecutionError, Orchestrator};
use crate::outcome::{
    OutcomeSink, RoutingFailure, RoutingResult, StageReport, TracingSink, baseline_cost_usd,
    cost_saved_usd,
};
use crate::ratelimit::{EndpointClass, RateLimiter};

/// Caller identity used when a request does not name one.
pub const ANONYMOUS_CALLER: &str = "anonymous";

/// One inbound request.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub text: String,
    pub caller: String,
    /// `None` uses the configured default.
    pub max_output_tokens: Option<u32>,
    /// Stream Stage A and forward deltas; never escalates.
    pub streaming: bool,
    /// Run at this tier regardless of the score, without self-evaluation.
    pub force_tier: Option<Tier>,
    pub cancel: Option<CancellationToken>,
    pub deltas: Option<mpsc::Sender<String>>,
}

impl RouteRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            caller: ANONYMOUS_CALLER.to_string(),
            max_output_tokens: None,
            streaming: false,
            force_tier: None,
            cancel: None,
            deltas: None,
        }
    }

    pub fn caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = caller.into();
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Pin the request to `tier`. The request is still scored, but only Stage
    /// A runs and it never escalates.
    pub fn force_tier(mut self, tier: Tier) -> Self {
        self.force_tier = Some(tier);
        self
    }

    /// Request streaming; each text delta is sent on `deltas`.
    pub fn streaming(mut self, deltas: mpsc::Sender<String>) -> Self {
        self.streaming = true;
        self.deltas = Some(deltas);
        self
    }
}

/// Routes requests to the cheapest adequate tier and escalates once when the
/// model is unsure.
pub struct RoutingEngine {
    router: Arc<Router>,
    limits: InputLimits,
    gate: Arc<AdmissionGate>,
    orchestrator: Orchestrator,
    request_timeout: Duration,
    sinks: Vec<Arc<dyn OutcomeSink>>,
}

impl RoutingEngine {
    /// Build an engine from validated configuration. Outcomes go to a
    /// [`TracingSink`] until more sinks are added.
    pub fn new(
        config: &TiergateConfig,
        provider: Arc<dyn ProviderAdapter>,
        budget: Arc<dyn BudgetStore>,
    ) -> Result<Self, TiergateError> {
        let router = Arc::new(Router::new(&config.routing, &config.tiers)?);
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let gate = Arc::new(AdmissionGate::new(limiter, budget));
        let orchestrator = Orchestrator::new(
            provider,
            Arc::clone(&gate),
            RetryPolicy::from_config(&config.retry),
            config.routing.confidence_threshold,
        );

        Ok(Self {
            router,
            limits: InputLimits::from(&config.engine),
            gate,
            orchestrator,
            request_timeout: Duration::from_secs(config.engine.request_timeout_secs.max(1)),
            sinks: vec![Arc::new(TracingSink)],
        })
    }

    /// Add an outcome sink.
    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn limiter(&self) -> &RateLimiter {
        self.gate.limiter()
    }

    /// Score `text` without admission checks or provider calls.
    pub fn analyze(&self, text: &str) -> Analysis {
        self.router.analyze(&sanitize(text))
    }

    /// Rate check for endpoints other than `route`.
    pub fn check_rate(&self, caller: &str, class: EndpointClass) -> Result<(), TiergateError> {
        self.gate.check_rate(caller, class)
    }

    pub fn status(&self) -> BudgetStatus {
        self.gate.budget_status()
    }

    /// Route one request through validation, scoring, admission, and the
    /// two-stage execution. Every outcome reaches the configured sinks.
    #[instrument(
        skip_all,
        fields(caller = %request.caller, streaming = request.streaming, forced = ?request.force_tier)
    )]
    pub async fn route(&self, request: RouteRequest) -> Result<RoutingResult, RoutingFailure> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let clock = Instant::now();
        let deadline = clock + self.request_timeout;

        let fail = |error: TiergateError, analysis: Option<&Analysis>, stages: Vec<StageReport>| {
            let failure = RoutingFailure {
                request_id: request_id.clone(),
                caller: request.caller.clone(),
                error,
                breakdown: analysis.map(|a| a.breakdown.clone()),
                retries: stages.iter().map(|s| s.retries).sum(),
                stages,
                forced: request.force_tier.is_some(),
                streamed: request.streaming,
                created_at,
                latency_ms: elapsed_ms(clock),
            };
            for sink in &self.sinks {
                sink.record_failure(&failure);
            }
            failure
        };

        let input = match self.limits.validate(&request.text, request.max_output_tokens) {
            Ok(input) => input,
            Err(error) => return Err(fail(error, None, Vec::new())),
        };
        let mut analysis = self.router.analyze(&input.text);
        if let Some(tier) = request.force_tier {
            analysis.tier = tier;
        }
        debug!(
            request_id = %request_id,
            score = analysis.breakdown.score,
            tier = %analysis.tier,
            forced = request.force_tier.is_some(),
            hard_triggered = analysis.breakdown.hard_triggered,
            "request scored"
        );

        if let Err(error) = self.gate.check_rate(&request.caller, EndpointClass::Route) {
            return Err(fail(error, Some(&analysis), Vec::new()));
        }

        let cancel = request.cancel.clone().unwrap_or_default();
        let ctx = ExecutionContext {
            request_id: &request_id,
            text: &input.text,
            analysis: &analysis,
            catalog: self.router.catalog(),
            max_output_tokens: input.max_output_tokens,
            cancel: &cancel,
            deadline,
            timeout: self.request_timeout,
            streaming: request.streaming,
            deltas: request.deltas.as_ref().filter(|_| request.streaming),
            forced: request.force_tier.is_some(),
            sinks: &self.sinks,
        };

        let execution = match self.orchestrator.execute(&ctx).await {
            Ok(execution) => execution,
            Err(ExecutionError { error, stages }) => {
                return Err(fail(error, Some(&analysis), stages));
            }
        };

        let catalog = self.router.catalog();
        let initial = catalog.definition(analysis.tier);
        let escalated_to = execution
            .stages
            .iter()
            .find(|s| s.stage == LedgerStage::StageB);
        let cost_usd: f64 = execution.stages.iter().map(|s| s.cost_usd).sum();
        let baseline = baseline_cost_usd(&execution.stages, &catalog.highest().pricing);

        let result = RoutingResult {
            request_id,
            caller: request.caller,
            created_at,
            text: execution.text,
            initial_tier: initial.tier,
            initial_model: initial.model.clone(),
            escalated_tier: escalated_to.map(|s| s.tier),
            escalated_model: escalated_to.map(|s| s.model.clone()),
            escalated: execution.escalated,
            escalation_skipped: execution.escalation_skipped,
            confidence: execution.evaluation.as_ref().map(|e| e.confidence),
            streamed: request.streaming,
            forced: request.force_tier.is_some(),
            breakdown: analysis.breakdown,
            cost_usd,
            baseline_cost_usd: baseline,
            cost_saved_usd: cost_saved_usd(baseline, cost_usd),
            latency_ms: elapsed_ms(clock),
            stages: execution.stages,
        };

        for sink in &self.sinks {
            sink.record(&result);
        }
        Ok(result)
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
