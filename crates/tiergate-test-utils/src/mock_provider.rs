// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted LLM provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` by replaying a queue of
//! [`MockReply`] values, one per call, so tests can script a Stage A reply,
//! a failure, or a hang without external API calls.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Mutex;

use tiergate_core::{
    HealthStatus, PluginAdapter, ProviderAdapter, ProviderFailureKind, ProviderRequest,
    ProviderResponse, ProviderStream, ProviderStreamChunk, TiergateError, TokenUsage,
};

/// Usage reported for every scripted reply that reports usage.
pub const MOCK_USAGE: TokenUsage = TokenUsage {
    input_tokens: 10,
    output_tokens: 20,
};

/// One scripted provider outcome.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Full response text. Streamed as a single delta.
    Text(String),
    /// The call fails with this kind.
    Fail(ProviderFailureKind),
    /// Streamed as these deltas followed by usage and a stop event.
    Deltas(Vec<String>),
    /// Streamed as these deltas and a stop event, with no usage report.
    DeltasWithoutUsage(Vec<String>),
    /// The stream yields these deltas and then fails.
    DeltasThenFail(Vec<String>, ProviderFailureKind),
    /// The call never completes.
    Hang,
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// A Stage A reply carrying a self-evaluation line.
    pub fn evaluated(answer: &str, confidence: f64, escalate: bool) -> Self {
        Self::Text(format!(
            "{answer}\nSELF_EVAL: {{\"confidence\": {confidence}, \"should_escalate\": {escalate}, \"reasons\": [\"scripted\"]}}"
        ))
    }
}

/// A mock LLM provider that replays scripted replies.
///
/// Replies are popped from a FIFO queue. When the queue is empty, a default
/// "mock response" text is returned. Every request is recorded.
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
}

impl MockProvider {
    /// Create a new mock provider with an empty reply queue.
    pub fn new() -> Self {
        Self::with_replies(Vec::new())
    }

    /// Create a mock provider pre-loaded with the given replies.
    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a reply to the end of the queue.
    pub async fn push(&self, reply: MockReply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Requests received so far, in call order.
    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    async fn next_reply(&self, request: &ProviderRequest) -> MockReply {
        self.requests.lock().await.push(request.clone());
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| MockReply::text("mock response"))
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn failure(kind: ProviderFailureKind) -> TiergateError {
    TiergateError::provider(kind, format!("scripted {kind} failure"))
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, TiergateError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TiergateError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, TiergateError> {
        let content = match self.next_reply(&request).await {
            MockReply::Text(text) => text,
            MockReply::Deltas(deltas) | MockReply::DeltasWithoutUsage(deltas) => deltas.concat(),
            MockReply::Fail(kind) | MockReply::DeltasThenFail(_, kind) => {
                return Err(failure(kind));
            }
            MockReply::Hang => return std::future::pending().await,
        };
        Ok(ProviderResponse {
            id: format!("mock-resp-{}", uuid::Uuid::new_v4()),
            content,
            model: request.model,
            stop_reason: Some("stop".to_string()),
            usage: MOCK_USAGE,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, TiergateError> {
        type Chunk = Result<ProviderStreamChunk, TiergateError>;
        let stop = || -> Chunk { Ok(ProviderStreamChunk::stop(Some("stop".to_string()))) };
        let deltas = |deltas: Vec<String>| -> Vec<Chunk> {
            deltas
                .into_iter()
                .map(|d| Ok(ProviderStreamChunk::delta(d)))
                .collect()
        };

        let chunks = match self.next_reply(&request).await {
            MockReply::Text(text) => {
                let mut chunks = deltas(vec![text]);
                chunks.push(Ok(ProviderStreamChunk::usage(MOCK_USAGE)));
                chunks.push(stop());
                chunks
            }
            MockReply::Deltas(parts) => {
                let mut chunks = deltas(parts);
                chunks.push(Ok(ProviderStreamChunk::usage(MOCK_USAGE)));
                chunks.push(stop());
                chunks
            }
            MockReply::DeltasWithoutUsage(parts) => {
                let mut chunks = deltas(parts);
                chunks.push(stop());
                chunks
            }
            MockReply::DeltasThenFail(parts, kind) => {
                let mut chunks = deltas(parts);
                chunks.push(Err(failure(kind)));
                chunks
            }
            MockReply::Fail(kind) => return Err(failure(kind)),
            MockReply::Hang => return std::future::pending().await,
        };

        Ok(Box::pin(stream::iter(chunks)))
    }
}
