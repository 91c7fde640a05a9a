// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible provider adapter for tiergate.
//!
//! Implements [`ProviderAdapter`] over the chat completions API, with both
//! buffered completion and SSE streaming. Any endpoint that speaks the same
//! protocol (a proxy, a local server) works through `provider.base_url`.

pub mod client;
pub mod sse;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::StreamExt;
use tiergate_config::model::ProviderConfig;
use tiergate_core::{
    HealthStatus, PluginAdapter, ProviderAdapter, ProviderFailureKind, ProviderRequest,
    ProviderResponse, ProviderStream, ProviderStreamChunk, TiergateError, TokenUsage,
};
use tracing::{debug, info};

use crate::client::OpenAiClient;
use crate::sse::SseEvent;
use crate::types::{ApiUsage, ChatMessage, ChatRequest, StreamOptions};

/// Environment variable consulted when `provider.api_key` is unset.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Chat completions provider implementing [`ProviderAdapter`].
pub struct OpenAiProvider {
    client: OpenAiClient,
}

impl OpenAiProvider {
    /// Creates a provider from configuration.
    ///
    /// API key resolution order: `provider.api_key`, then `OPENAI_API_KEY`.
    pub fn new(config: &ProviderConfig) -> Result<Self, TiergateError> {
        let api_key = resolve_api_key(config.api_key.as_deref())?;
        let client = OpenAiClient::new(
            &api_key,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )?;
        info!(endpoint = client.endpoint(), "chat completions provider initialized");
        Ok(Self { client })
    }

    /// Creates a provider around an existing client.
    pub fn with_client(client: OpenAiClient) -> Self {
        Self { client }
    }

    fn to_chat_request(request: &ProviderRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(request.text.clone()));

        ChatRequest {
            model: request.model.clone(),
            messages,
            max_completion_tokens: request.max_tokens,
            stream: request.stream,
            stream_options: request.stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

fn usage(api: ApiUsage) -> TokenUsage {
    TokenUsage {
        input_tokens: api.prompt_tokens,
        output_tokens: api.completion_tokens,
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, TiergateError> {
        // No token-consuming probe; a constructed client is considered healthy.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TiergateError> {
        debug!("chat completions provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, TiergateError> {
        let chat_request = Self::to_chat_request(&request);
        let response = self.client.complete(&chat_request).await?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            TiergateError::provider(
                ProviderFailureKind::InvalidResponse,
                "response contained no choices",
            )
        })?;

        Ok(ProviderResponse {
            id: response.id,
            content: choice.message.content.unwrap_or_default(),
            model: response.model,
            stop_reason: choice.finish_reason,
            usage: response.usage.map(usage).unwrap_or_default(),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, TiergateError> {
        let chat_request = Self::to_chat_request(&request);
        let events = self.client.stream(&chat_request).await?;

        let mut stop_reason: Option<String> = None;
        let chunks = events.flat_map(move |result| {
            let out: Vec<Result<ProviderStreamChunk, TiergateError>> = match result {
                Ok(SseEvent::Chunk(chunk)) => {
                    let mut out = Vec::new();
                    for choice in chunk.choices {
                        if let Some(reason) = choice.finish_reason {
                            stop_reason = Some(reason);
                        }
                        if let Some(text) = choice.delta.content {
                            if !text.is_empty() {
                                out.push(Ok(ProviderStreamChunk::delta(text)));
                            }
                        }
                    }
                    if let Some(u) = chunk.usage {
                        out.push(Ok(ProviderStreamChunk::usage(usage(u))));
                    }
                    out
                }
                Ok(SseEvent::Done) => vec![Ok(ProviderStreamChunk::stop(stop_reason.take()))],
                Err(e) => vec![Err(e)],
            };
            futures::stream::iter(out)
        });

        Ok(Box::pin(chunks))
    }
}

/// Resolves the API key from config or environment.
fn resolve_api_key(config_key: Option<&str>) -> Result<String, TiergateError> {
    if let Some(key) = config_key {
        if !key.trim().is_empty() {
            return Ok(key.to_string());
        }
    }
    std::env::var(API_KEY_ENV)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            TiergateError::Config(format!(
                "API key not found. Set provider.api_key in config or the {API_KEY_ENV} environment variable."
            ))
        })
}
