// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE parser for streaming chat completions.
//!
//! Each `data:` line carries one JSON [`ChatChunk`]; the literal `[DONE]`
//! marks the end of the response.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use tiergate_core::{ProviderFailureKind, TiergateError};

use crate::types::ChatChunk;

/// Terminal payload of a chat completions stream.
const DONE_MARKER: &str = "[DONE]";

/// Typed events of a chat completions stream.
#[derive(Debug, Clone)]
pub enum SseEvent {
    Chunk(ChatChunk),
    Done,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<SseEvent, TiergateError>> + Send>>;

/// Parses a streaming response body into [`SseEvent`]s.
///
/// Comment lines and empty `data:` payloads are skipped.
pub fn parse_sse_stream(response: reqwest::Response) -> ChunkStream {
    let event_stream = response.bytes_stream().eventsource();

    let mapped = event_stream.filter_map(|result| async move {
        match result {
            Ok(event) => {
                let data = event.data.trim();
                if data.is_empty() {
                    return None;
                }
                if data == DONE_MARKER {
                    return Some(Ok(SseEvent::Done));
                }
                Some(
                    serde_json::from_str::<ChatChunk>(data)
                        .map(SseEvent::Chunk)
                        .map_err(|e| {
                            TiergateError::provider(
                                ProviderFailureKind::InvalidResponse,
                                format!("failed to parse stream chunk: {e}"),
                            )
                        }),
                )
            }
            Err(e) => Some(Err(TiergateError::provider(
                ProviderFailureKind::Connectivity,
                format!("SSE stream error: {e}"),
            ))),
        }
    });

    Box::pin(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn mock_sse_response(sse_text: &str) -> reqwest::Response {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_text.to_string()),
            )
            .mount(&server)
            .await;

        reqwest::get(&server.uri()).await.unwrap()
    }

    #[tokio::test]
    async fn parses_deltas_and_done() {
        let sse = "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n\
                   data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n\
                   data: [DONE]\n\n";
        let mut stream = parse_sse_stream(mock_sse_response(sse).await);

        let mut text = String::new();
        let mut done = false;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                SseEvent::Chunk(chunk) => {
                    for choice in chunk.choices {
                        text.push_str(choice.delta.content.as_deref().unwrap_or_default());
                    }
                }
                SseEvent::Done => done = true,
            }
        }
        assert_eq!(text, "Hello");
        assert!(done);
    }

    #[tokio::test]
    async fn usage_chunk_has_no_choices() {
        let sse = "data: {\"id\":\"c1\",\"choices\":[],\"usage\":{\"prompt_tokens\":7,\"completion_tokens\":3}}\n\n";
        let mut stream = parse_sse_stream(mock_sse_response(sse).await);
        match stream.next().await.unwrap().unwrap() {
            SseEvent::Chunk(chunk) => {
                assert!(chunk.choices.is_empty());
                assert_eq!(chunk.usage.unwrap().completion_tokens, 3);
            }
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_chunk_is_an_error() {
        let sse = "data: {not json}\n\n";
        let mut stream = parse_sse_stream(mock_sse_response(sse).await);
        assert!(stream.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn comments_are_skipped() {
        let sse = ": keep-alive\n\ndata: [DONE]\n\n";
        let mut stream = parse_sse_stream(mock_sse_response(sse).await);
        assert!(matches!(stream.next().await.unwrap().unwrap(), SseEvent::Done));
    }
}
