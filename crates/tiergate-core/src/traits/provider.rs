// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for LLM backends.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::TiergateError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, ProviderResponse, ProviderStreamChunk};

/// Boxed stream of response chunks returned by [`ProviderAdapter::stream`].
pub type ProviderStream =
    Pin<Box<dyn Stream<Item = Result<ProviderStreamChunk, TiergateError>> + Send>>;

/// Adapter for LLM provider integrations.
///
/// Adapters make exactly one attempt per call and classify failures with
/// [`ProviderFailureKind`](crate::ProviderFailureKind); retrying is the
/// caller's job.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, TiergateError>;

    /// Sends a completion request and returns a stream of response chunks.
    ///
    /// An `Err` here means the stream could not be established. Errors yielded
    /// by the stream itself happen after deltas may have been delivered.
    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, TiergateError>;
}
