// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for an OpenAI-compatible chat completions endpoint.
//!
//! [`OpenAiClient`] builds requests, authenticates, and classifies failures
//! into [`ProviderFailureKind`]s. It makes exactly one attempt per call; the
//! engine's retry policy decides whether to try again.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tiergate_core::{ProviderFailureKind, TiergateError};
use tracing::debug;

use crate::sse::{self, ChunkStream};
use crate::types::{ApiErrorResponse, ChatRequest, ChatResponse};

/// HTTP client for chat completions.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
}

impl OpenAiClient {
    /// Creates a client for `base_url` (for example `https://api.openai.com/v1`).
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, TiergateError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| TiergateError::Config(format!("invalid API key header value: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| TiergateError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends a buffered request and returns the parsed response.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, TiergateError> {
        let mut req = request.clone();
        req.stream = false;
        req.stream_options = None;

        let response = self.send(&req).await?;
        let body = response.text().await.map_err(transport_error)?;
        serde_json::from_str(&body).map_err(|e| {
            TiergateError::provider(
                ProviderFailureKind::InvalidResponse,
                format!("failed to parse API response: {e}"),
            )
        })
    }

    /// Sends a streaming request. Returns once the response headers arrived
    /// with a success status; the body is consumed through the stream.
    pub async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream, TiergateError> {
        let mut req = request.clone();
        req.stream = true;

        let response = self.send(&req).await?;
        Ok(sse::parse_sse_stream(response))
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, TiergateError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        debug!(status = %status, model = %request.model, stream = request.stream, "chat completions response received");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api_err) => match api_err.error.type_ {
                Some(type_) => format!("API error ({type_}): {}", api_err.error.message),
                None => format!("API error: {}", api_err.error.message),
            },
            Err(_) => format!("API returned {status}: {body}"),
        };
        Err(TiergateError::provider(classify_status(status), detail))
    }
}

/// Maps an HTTP status to a failure kind.
pub fn classify_status(status: StatusCode) -> ProviderFailureKind {
    match status.as_u16() {
        401 | 403 => ProviderFailureKind::Authentication,
        408 => ProviderFailureKind::Connectivity,
        429 => ProviderFailureKind::RateLimited,
        500..=599 => ProviderFailureKind::ServerError,
        _ => ProviderFailureKind::InvalidRequest,
    }
}

/// Transport failures (refused, reset, timed out) are connectivity problems;
/// body decoding failures are not worth retrying.
fn transport_error(e: reqwest::Error) -> TiergateError {
    let kind = if e.is_decode() {
        ProviderFailureKind::InvalidResponse
    } else {
        ProviderFailureKind::Connectivity
    };
    TiergateError::provider(kind, format!("HTTP request failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> OpenAiClient {
        OpenAiClient::new("test-api-key", base_url, Duration::from_secs(5)).unwrap()
    }

    fn test_request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![ChatMessage::user("Hello")],
            max_completion_tokens: 64,
            stream: false,
            stream_options: None,
        }
    }

    #[tokio::test]
    async fn complete_success() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi there!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-api-key"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.complete(&test_request()).await.unwrap();

        assert_eq!(result.id, "chatcmpl-1");
        assert_eq!(result.usage.unwrap().prompt_tokens, 10);
        assert_eq!(result.choices[0].message.content.as_deref(), Some("Hi there!"));
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url_is_tolerated() {
        let client = test_client("http://localhost:1/v1/");
        assert_eq!(client.endpoint(), "http://localhost:1/v1/chat/completions");
    }

    #[tokio::test]
    async fn rate_limit_is_transient() {
        let server = MockServer::start().await;
        let error_body = serde_json::json!({
            "error": {"message": "Rate limit reached", "type": "requests", "code": "rate_limit_exceeded"}
        });

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(&error_body))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .complete(&test_request())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("Rate limit reached"), "got: {err}");
    }

    #[tokio::test]
    async fn bad_key_is_fatal_authentication() {
        let server = MockServer::start().await;
        let error_body = serde_json::json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        });

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(&error_body))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .complete(&test_request())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(matches!(
            err,
            TiergateError::Provider {
                kind: ProviderFailureKind::Authentication,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn garbage_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .complete(&test_request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TiergateError::Provider {
                kind: ProviderFailureKind::InvalidResponse,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_connectivity() {
        // Nothing listens on port 9 of localhost in the test environment.
        let err = test_client("http://127.0.0.1:9")
            .complete(&test_request())
            .await
            .unwrap_err();
        assert!(err.is_transient(), "got: {err}");
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), ProviderFailureKind::Authentication);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), ProviderFailureKind::Authentication);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), ProviderFailureKind::RateLimited);
        assert_eq!(classify_status(StatusCode::SERVICE_UNAVAILABLE), ProviderFailureKind::ServerError);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), ProviderFailureKind::InvalidRequest);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), ProviderFailureKind::InvalidRequest);
    }
}
