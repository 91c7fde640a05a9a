// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: config text through the engine to an HTTP provider.
//!
//! Each test starts its own mock chat completions server, so tests are
//! independent and order-insensitive.

use std::sync::Arc;

use serde_json::json;
use tiergate_config::TiergateConfig;
use tiergate_core::{BudgetStore, ProviderFailureKind, Tier, TiergateError};
use tiergate_cost::BudgetTracker;
use tiergate_engine::{RouteRequest, RoutingEngine};
use tiergate_openai::OpenAiProvider;
use tiergate_test_utils::MemorySink;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(model: &str, content: &str) -> serde_json::Value {
    json!({
        "id": format!("chatcmpl-{model}"),
        "model": model,
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
    })
}

fn config_for(server: &MockServer, extra: &str) -> TiergateConfig {
    let toml = format!(
        r#"
[provider]
api_key = "sk-test"
base_url = "{uri}/v1"

[cost]
ledger_enabled = false
monthly_budget_usd = 5.0

[retry]
backoff_floor_ms = 1
backoff_ceiling_ms = 2
backoff_multiplier_ms = 1
{extra}
"#,
        uri = server.uri()
    );
    tiergate_config::load_and_validate_str(&toml).unwrap()
}

fn engine_for(config: &TiergateConfig) -> (RoutingEngine, Arc<MemorySink>, Arc<BudgetTracker>) {
    let provider = Arc::new(OpenAiProvider::new(&config.provider).unwrap());
    let budget = Arc::new(BudgetTracker::new(&config.cost));
    let sink = Arc::new(MemorySink::new());
    let engine = RoutingEngine::new(config, provider, budget.clone())
        .unwrap()
        .with_sink(sink.clone());
    (engine, sink, budget)
}

// ---- Escalation over HTTP ----

#[tokio::test]
async fn unsure_low_tier_escalates_to_mid_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "gpt-4o-mini",
            "Probably 4.\nSELF_EVAL: {\"confidence\": 0.4, \"should_escalate\": false, \"reasons\": [\"unsure\"]}",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "gpt-4o"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("gpt-4o", "4")))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server, "");
    let (engine, sink, budget) = engine_for(&config);
    let result = engine
        .route(RouteRequest::new("What is 2+2?").caller("e2e"))
        .await
        .unwrap();

    assert_eq!(result.text, "4");
    assert!(result.escalated);
    assert_eq!(result.initial_tier, Tier::Low);
    assert_eq!(result.escalated_tier, Some(Tier::Mid));
    assert_eq!(result.usage().input_tokens, 240);

    // 120 in / 30 out on each tier.
    let expected = (120.0 * 0.15 + 30.0 * 0.60 + 120.0 * 2.50 + 30.0 * 10.0) / 1e6;
    assert!((result.cost_usd - expected).abs() < 1e-12);
    assert!((budget.status().spent_usd - expected).abs() < 1e-12);
    assert_eq!(sink.results().len(), 1);
}

#[tokio::test]
async fn stage_b_request_carries_router_context_not_self_eval() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "gpt-4o-mini",
            "Maybe.\nSELF_EVAL: {\"confidence\": 0.9, \"should_escalate\": true, \"reasons\": [\"ambiguous\"]}",
        )))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "gpt-4o"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("gpt-4o", "Sure.")))
        .mount(&server)
        .await;

    let config = config_for(&server, "");
    let (engine, _, _) = engine_for(&config);
    engine.route(RouteRequest::new("What is 2+2?")).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let stage_b: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    let system = stage_b["messages"][0]["content"].as_str().unwrap();
    assert_eq!(stage_b["messages"][0]["role"], "system");
    assert!(system.contains("reasons=ambiguous"));
    assert!(!system.contains("SELF_EVAL:"));
    assert_eq!(stage_b["messages"][1]["content"], "What is 2+2?");
}

// ---- Streaming ----

#[tokio::test]
async fn streaming_over_sse_delivers_deltas() {
    let server = MockServer::start().await;
    let sse = [
        r#"data: {"id":"c1","choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#,
        r#"data: {"id":"c1","choices":[{"index":0,"delta":{"content":"lo"},"finish_reason":"stop"}]}"#,
        r#"data: {"id":"c1","choices":[],"usage":{"prompt_tokens":12,"completion_tokens":2,"total_tokens":14}}"#,
        "data: [DONE]",
    ]
    .join("\n\n")
        + "\n\n";
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"stream": true, "stream_options": {"include_usage": true}})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server, "");
    let (engine, _, _) = engine_for(&config);
    let (tx, mut rx) = mpsc::channel(8);
    let result = engine
        .route(RouteRequest::new("Say hello").streaming(tx))
        .await
        .unwrap();

    assert_eq!(result.text, "Hello");
    assert!(result.streamed);
    assert!(!result.escalated);
    assert_eq!(result.usage().input_tokens, 12);
    assert_eq!(result.usage().output_tokens, 2);

    let mut deltas = Vec::new();
    while let Ok(d) = rx.try_recv() {
        deltas.push(d);
    }
    assert_eq!(deltas, vec!["Hel", "lo"]);
}

// ---- Failure classification ----

#[tokio::test]
async fn server_errors_are_retried_then_fail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(3)
        .mount(&server)
        .await;

    let config = config_for(&server, "");
    let (engine, sink, budget) = engine_for(&config);
    let failure = engine
        .route(RouteRequest::new("What is 2+2?"))
        .await
        .unwrap_err();

    assert_eq!(failure.status_code(), 502);
    assert!(matches!(
        failure.error,
        TiergateError::Provider {
            kind: ProviderFailureKind::ServerError,
            retries: 2,
            ..
        }
    ));
    assert_eq!(sink.failures().len(), 1);
    assert_eq!(budget.status().spent_usd, 0.0);
}

#[tokio::test]
async fn rejected_key_fails_after_one_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error", "code": "invalid_api_key"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server, "");
    let (engine, _, _) = engine_for(&config);
    let failure = engine
        .route(RouteRequest::new("What is 2+2?"))
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        TiergateError::Provider {
            kind: ProviderFailureKind::Authentication,
            retries: 0,
            ..
        }
    ));
}

// ---- Configuration ----

#[tokio::test]
async fn configured_threshold_and_models_are_used() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "small-model"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "small-model",
            "4\nSELF_EVAL: {\"confidence\": 0.5, \"should_escalate\": false}",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let extra = r#"
[routing]
confidence_threshold = 0.4

[tiers.low]
model = "small-model"
"#;
    let config = config_for(&server, extra);
    let (engine, _, _) = engine_for(&config);
    let result = engine.route(RouteRequest::new("What is 2+2?")).await.unwrap();

    assert_eq!(result.initial_model, "small-model");
    assert!(!result.escalated);
    assert_eq!(result.text, "4");
}
