// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outcome sink that keeps results in memory.

use std::sync::{Mutex, MutexGuard};

use tiergate_engine::{AbandonedCall, OutcomeSink, RoutingFailure, RoutingResult};

/// Captures every outcome the engine reports.
///
/// Failures are stored as `(request_id, status_code)` since
/// [`RoutingFailure`] owns a non-cloneable error.
#[derive(Debug, Default)]
pub struct MemorySink {
    results: Mutex<Vec<RoutingResult>>,
    failures: Mutex<Vec<(String, u16)>>,
    abandoned: Mutex<Vec<AbandonedCall>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<RoutingResult> {
        lock(&self.results).clone()
    }

    pub fn failures(&self) -> Vec<(String, u16)> {
        lock(&self.failures).clone()
    }

    /// Calls abandoned by dropped requests.
    pub fn abandoned(&self) -> Vec<AbandonedCall> {
        lock(&self.abandoned).clone()
    }
}

impl OutcomeSink for MemorySink {
    fn record(&self, result: &RoutingResult) {
        lock(&self.results).push(result.clone());
    }

    fn record_failure(&self, failure: &RoutingFailure) {
        lock(&self.failures).push((failure.request_id.clone(), failure.status_code()));
    }

    fn record_abandoned(&self, call: &AbandonedCall) {
        lock(&self.abandoned).push(call.clone());
    }
}
