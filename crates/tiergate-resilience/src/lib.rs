// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for tiergate provider calls.
//!
//! - [`RetryPolicy`]: bounded attempts with clamped exponential backoff,
//!   retrying only transient provider failures.

pub mod retry;

pub use retry::RetryPolicy;
