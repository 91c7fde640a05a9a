// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry loop with exponential backoff.
//!
//! The delay before retry `n` (0-based) is
//! `clamp(multiplier * 2^n, floor, ceiling)`. Only errors for which
//! [`TiergateError::is_transient`] holds are retried; everything else is
//! returned after the first attempt. Sleeps go through `tokio::time` so a
//! paused test clock drives them.

use std::future::Future;
use std::time::Duration;

use tiergate_config::model::RetryConfig;
use tiergate_core::TiergateError;
use tracing::{debug, warn};

/// Attempts and backoff for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    floor: Duration,
    ceiling: Duration,
    multiplier: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, floor: Duration, ceiling: Duration, multiplier: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            floor,
            ceiling: ceiling.max(floor),
            multiplier,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.backoff_floor_ms),
            Duration::from_millis(config.backoff_ceiling_ms),
            Duration::from_millis(config.backoff_multiplier_ms),
        )
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before retry number `retry` (0 for the first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.multiplier
            .checked_mul(factor)
            .unwrap_or(self.ceiling)
            .clamp(self.floor, self.ceiling)
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// `op` receives the 0-based attempt number. On success the value comes
    /// back with the number of retries consumed; on failure the error carries
    /// that count (see [`TiergateError::with_retries`]).
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<(T, u32), TiergateError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TiergateError>>,
    {
        let mut retries = 0;
        loop {
            match op(retries).await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(label, retries, "call succeeded after retry");
                    }
                    return Ok((value, retries));
                }
                Err(err) if err.is_transient() && retries + 1 < self.max_attempts => {
                    let delay = self.delay_for(retries);
                    warn!(
                        label,
                        attempt = retries + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(label, attempts = retries + 1, error = %err, "retries exhausted");
                    }
                    return Err(err.with_retries(retries));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tiergate_core::ProviderFailureKind;
    use tokio::time::Instant;

    use super::*;

    fn transient() -> TiergateError {
        TiergateError::provider(ProviderFailureKind::ServerError, "503")
    }

    #[test]
    fn delays_are_clamped_exponential() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let start = Instant::now();

        let (value, retries) = RetryPolicy::default()
            .run("test", |_| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(retries, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = RetryPolicy::default()
            .run::<(), _, _>("test", |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.retries(), 2);
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_are_not_retried() {
        for kind in [
            ProviderFailureKind::Authentication,
            ProviderFailureKind::InvalidRequest,
        ] {
            let calls = Arc::new(AtomicU32::new(0));
            let counter = calls.clone();
            let err = RetryPolicy::default()
                .run::<(), _, _>("test", |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { Err(TiergateError::provider(kind, "nope")) }
                })
                .await
                .unwrap_err();
            assert_eq!(calls.load(Ordering::SeqCst), 1, "{kind}");
            assert_eq!(err.retries(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_number_is_passed_through() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = seen.clone();
        let _ = RetryPolicy::default()
            .run::<(), _, _>("test", |attempt| {
                log.lock().unwrap().push(attempt);
                async { Err(transient()) }
            })
            .await;
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn no_retry_policy_makes_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let _ = RetryPolicy::no_retry()
            .run::<(), _, _>("test", |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
