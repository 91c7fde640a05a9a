// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tiergate route` command implementation.
//!
//! Wires the chat completions provider, the budget tracker (re-hydrated from
//! the cost ledger), and the ledger writer into a [`RoutingEngine`], routes
//! one request, and prints the answer on stdout with a summary on stderr.

use std::io::Write;
use std::sync::Arc;

use tiergate_config::TiergateConfig;
use tiergate_core::{ProviderAdapter, Tier, TiergateError};
use tiergate_cost::{BudgetTracker, CostLedger};
use tiergate_engine::{LEDGER_QUEUE_CAPACITY, LedgerSink, RouteRequest, RoutingEngine, RoutingResult};
use tiergate_openai::OpenAiProvider;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::shutdown;

/// Flags of `tiergate route`.
#[derive(Debug, Clone)]
pub struct RouteOptions {
    pub caller: String,
    pub max_tokens: Option<u32>,
    pub stream: bool,
    pub tier: Option<Tier>,
    pub json: bool,
}

/// An engine plus the background ledger writer feeding it, if any.
pub struct Runtime {
    pub engine: RoutingEngine,
    ledger_writer: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Build the engine for `config` around `provider`.
    pub async fn build(
        config: &TiergateConfig,
        provider: Arc<dyn ProviderAdapter>,
    ) -> Result<Self, TiergateError> {
        let ledger = if config.cost.ledger_enabled {
            Some(CostLedger::open(&config.storage.database_path).await?)
        } else {
            None
        };

        // Restart recovery: budget totals come from the ledger.
        let budget = Arc::new(match &ledger {
            Some(ledger) => BudgetTracker::from_ledger(&config.cost, ledger).await?,
            None => BudgetTracker::new(&config.cost),
        });

        let mut engine = RoutingEngine::new(config, provider, budget)?;
        let mut ledger_writer = None;
        if let Some(ledger) = ledger {
            let (sink, handle) = LedgerSink::spawn(ledger, LEDGER_QUEUE_CAPACITY);
            engine = engine.with_sink(Arc::new(sink));
            ledger_writer = Some(handle);
        }

        Ok(Self {
            engine,
            ledger_writer,
        })
    }

    /// Drop the engine and wait until every queued cost record is written.
    pub async fn shutdown(self) {
        let Self {
            engine,
            ledger_writer,
        } = self;
        drop(engine);
        if let Some(handle) = ledger_writer {
            let _ = handle.await;
            debug!("cost ledger writer drained");
        }
    }
}

/// Run the `tiergate route` command.
pub async fn run_route(
    config: &TiergateConfig,
    text: String,
    options: RouteOptions,
) -> Result<(), TiergateError> {
    let provider = Arc::new(OpenAiProvider::new(&config.provider)?);
    let runtime = Runtime::build(config, provider).await?;
    let cancel = shutdown::install_signal_handler();

    let mut request = RouteRequest::new(text)
        .caller(options.caller)
        .cancel(cancel.clone());
    if let Some(max) = options.max_tokens {
        request = request.max_output_tokens(max);
    }
    if let Some(tier) = options.tier {
        request = request.force_tier(tier);
    }

    let printer = if options.stream {
        let (tx, rx) = mpsc::channel::<String>(64);
        request = request.streaming(tx);
        Some(tokio::spawn(print_deltas(rx, !options.json)))
    } else {
        None
    };

    let outcome = runtime.engine.route(request).await;
    // Release the signal handler task.
    cancel.cancel();
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    runtime.shutdown().await;

    let result = outcome.map_err(|failure| {
        info!(
            request_id = %failure.request_id,
            status = failure.status_code(),
            "route failed"
        );
        failure.error
    })?;

    if options.json {
        let out = serde_json::to_string_pretty(&result)
            .map_err(|e| TiergateError::Internal(format!("failed to encode result: {e}")))?;
        println!("{out}");
    } else {
        if !options.stream {
            println!("{}", result.text);
        }
        eprintln!("{}", summary(&result));
    }
    Ok(())
}

/// Write deltas to stdout as they arrive.
async fn print_deltas(mut rx: mpsc::Receiver<String>, echo: bool) {
    let mut stdout = std::io::stdout();
    while let Some(delta) = rx.recv().await {
        if echo {
            let _ = stdout.write_all(delta.as_bytes());
            let _ = stdout.flush();
        }
    }
    if echo {
        let _ = writeln!(stdout);
    }
}

/// One-line description of how a request was served.
pub fn summary(result: &RoutingResult) -> String {
    let mut line = format!("[{} {}", result.initial_tier, result.initial_model);
    if result.forced {
        line.push_str(" (forced)");
    }
    if let (true, Some(tier), Some(model)) = (
        result.escalated,
        result.escalated_tier,
        result.escalated_model.as_deref(),
    ) {
        line.push_str(&format!(" -> {tier} {model}"));
    }
    if let Some(skip) = result.escalation_skipped {
        line.push_str(&format!(", escalation skipped ({skip})"));
    }
    let usage = result.usage();
    line.push_str(&format!(
        "] score={} tokens={}/{} cost=${:.6} saved=${:.6} {}ms",
        result.breakdown.score,
        usage.input_tokens,
        usage.output_tokens,
        result.cost_usd,
        result.cost_saved_usd,
        result.latency_ms,
    ));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiergate_test_utils::{MockProvider, MockReply};

    fn config_without_ledger() -> TiergateConfig {
        let mut config = TiergateConfig::default();
        config.cost.ledger_enabled = false;
        config
    }

    #[tokio::test]
    async fn summary_shows_escalation_path() {
        let config = config_without_ledger();
        let provider = Arc::new(MockProvider::with_replies(vec![
            MockReply::evaluated("maybe", 0.1, false),
            MockReply::text("surely"),
        ]));
        let runtime = Runtime::build(&config, provider).await.unwrap();
        let result = runtime
            .engine
            .route(RouteRequest::new("What is 2+2?"))
            .await
            .unwrap();
        runtime.shutdown().await;

        let line = summary(&result);
        assert!(line.starts_with("[low gpt-4o-mini -> mid gpt-4o]"), "{line}");
        assert!(line.contains("tokens=20/40"), "{line}");
    }

    #[tokio::test]
    async fn summary_marks_forced_tier() {
        let config = config_without_ledger();
        let provider = Arc::new(MockProvider::with_replies(vec![MockReply::text("4")]));
        let runtime = Runtime::build(&config, provider).await.unwrap();
        let result = runtime
            .engine
            .route(RouteRequest::new("What is 2+2?").force_tier(Tier::Mid))
            .await
            .unwrap();
        runtime.shutdown().await;

        let line = summary(&result);
        assert!(line.starts_with("[mid gpt-4o (forced)]"), "{line}");
    }

    #[tokio::test]
    async fn ledger_backed_runtime_recovers_spend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TiergateConfig::default();
        config.storage.database_path = dir.path().join("t.db").to_string_lossy().into_owned();

        let runtime = Runtime::build(&config, Arc::new(MockProvider::new()))
            .await
            .unwrap();
        let result = runtime
            .engine
            .route(RouteRequest::new("Design a production authentication system handling PII"))
            .await
            .unwrap();
        runtime.shutdown().await;

        // A fresh runtime starts from the persisted totals.
        let runtime = Runtime::build(&config, Arc::new(MockProvider::new()))
            .await
            .unwrap();
        let status = runtime.engine.status();
        assert!((status.spent_usd - result.cost_usd).abs() < 1e-12);
        assert_eq!(status.request_count, 1);
        runtime.shutdown().await;
    }
}
