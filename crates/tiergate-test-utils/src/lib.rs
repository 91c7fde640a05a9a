// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for tiergate integration tests.
//!
//! Provides a scripted provider, a capturing outcome sink, and a harness that
//! assembles a complete engine without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - Provider that replays scripted [`MockReply`] values
//! - [`MemorySink`] - Outcome sink that keeps every result for assertions
//! - [`TestHarness`] - Engine, budget, provider, and sink wired together

pub mod harness;
pub mod memory_sink;
pub mod mock_provider;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use memory_sink::MemorySink;
pub use mock_provider::{MOCK_USAGE, MockProvider, MockReply};
