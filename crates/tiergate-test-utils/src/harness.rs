// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete routing engine with a scripted
//! provider, an in-process budget tracker, a capturing sink, and optionally
//! a cost ledger in a temp directory.

use std::sync::Arc;

use tiergate_config::model::{CostConfig, RateLimitConfig, RetryConfig, TiergateConfig};
use tiergate_core::TiergateError;
use tiergate_cost::{BudgetTracker, CostLedger};
use tiergate_engine::{
    LEDGER_QUEUE_CAPACITY, LedgerSink, RouteRequest, RoutingEngine, RoutingFailure, RoutingResult,
};
use tokio::task::JoinHandle;

use crate::memory_sink::MemorySink;
use crate::mock_provider::{MockProvider, MockReply};

/// Retry settings that keep real-clock tests fast.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        backoff_floor_ms: 1,
        backoff_ceiling_ms: 5,
        backoff_multiplier_ms: 1,
    }
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    replies: Vec<MockReply>,
    config: TiergateConfig,
    with_ledger: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = TiergateConfig::default();
        config.cost = CostConfig {
            monthly_budget_usd: None,
            daily_budget_usd: None,
            ledger_enabled: false,
        };
        config.rate_limit.enabled = false;
        config.retry = fast_retry();
        Self {
            replies: Vec::new(),
            config,
            with_ledger: false,
        }
    }

    /// Set scripted provider replies.
    pub fn with_replies(mut self, replies: Vec<MockReply>) -> Self {
        self.replies = replies;
        self
    }

    /// Set a monthly budget ceiling.
    pub fn with_monthly_budget(mut self, usd: f64) -> Self {
        self.config.cost.monthly_budget_usd = Some(usd);
        self
    }

    /// Set a daily budget ceiling.
    pub fn with_daily_budget(mut self, usd: f64) -> Self {
        self.config.cost.daily_budget_usd = Some(usd);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.config.routing.confidence_threshold = threshold;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Enable the rate limiter with this many `route` calls per window.
    pub fn with_route_limit(mut self, per_window: u32) -> Self {
        self.config.rate_limit = RateLimitConfig {
            enabled: true,
            route_per_window: per_window,
            ..RateLimitConfig::default()
        };
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.config.engine.request_timeout_secs = secs;
        self
    }

    /// Persist completed stages to a SQLite ledger in a temp directory.
    pub fn with_ledger(mut self) -> Self {
        self.with_ledger = true;
        self.config.cost.ledger_enabled = true;
        self
    }

    /// Apply an arbitrary config change.
    pub fn configure(mut self, f: impl FnOnce(&mut TiergateConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, TiergateError> {
        let provider = Arc::new(MockProvider::with_replies(self.replies));
        let sink = Arc::new(MemorySink::new());

        let (ledger, temp_dir) = if self.with_ledger {
            let temp_dir =
                tempfile::TempDir::new().map_err(|e| TiergateError::Storage { source: e.into() })?;
            let db_path = temp_dir.path().join("ledger.db");
            let ledger = CostLedger::open(&db_path.to_string_lossy()).await?;
            (Some(ledger), Some(temp_dir))
        } else {
            (None, None)
        };

        let budget = Arc::new(match &ledger {
            Some(ledger) => BudgetTracker::from_ledger(&self.config.cost, ledger).await?,
            None => BudgetTracker::new(&self.config.cost),
        });

        let mut engine = RoutingEngine::new(&self.config, provider.clone(), budget.clone())?
            .with_sink(sink.clone());
        let mut ledger_writer = None;
        if let Some(ledger) = &ledger {
            let (ledger_sink, handle) = LedgerSink::spawn(ledger.clone(), LEDGER_QUEUE_CAPACITY);
            engine = engine.with_sink(Arc::new(ledger_sink));
            ledger_writer = Some(handle);
        }

        Ok(TestHarness {
            provider,
            budget,
            sink,
            engine: Some(engine),
            ledger,
            ledger_writer,
            config: self.config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with a scripted provider and temp storage.
pub struct TestHarness {
    /// The scripted LLM provider.
    pub provider: Arc<MockProvider>,
    /// Budget tracker the engine reserves against.
    pub budget: Arc<BudgetTracker>,
    /// Captures every routing outcome.
    pub sink: Arc<MemorySink>,
    engine: Option<RoutingEngine>,
    /// Cost ledger, when enabled.
    pub ledger: Option<CostLedger>,
    ledger_writer: Option<JoinHandle<()>>,
    /// Configuration the engine was built from.
    pub config: TiergateConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: Option<tempfile::TempDir>,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn engine(&self) -> &RoutingEngine {
        match &self.engine {
            Some(engine) => engine,
            None => panic!("engine already shut down"),
        }
    }

    /// Route `text` as caller "test".
    pub async fn route(&self, text: &str) -> Result<RoutingResult, RoutingFailure> {
        self.engine().route(RouteRequest::new(text).caller("test")).await
    }

    /// Drop the engine and wait for the ledger writer to drain.
    pub async fn shutdown(&mut self) {
        self.engine = None;
        if let Some(handle) = self.ledger_writer.take() {
            let _ = handle.await;
        }
    }
}
