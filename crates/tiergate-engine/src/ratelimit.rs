// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-caller sliding window rate limiter.
//!
//! Each `(caller, endpoint class)` pair owns a queue of admission instants.
//! A hit prunes entries that left the trailing window, rejects when the
//! remaining count meets the class ceiling, and otherwise records itself.
//! Keys live in a [`DashMap`], so unrelated callers never contend on one lock.
//! Once per window a hit also sweeps the map and reclaims idle keys.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use strum::{Display, EnumString};
use tiergate_config::model::RateLimitConfig;
use tiergate_core::TiergateError;
use tracing::{debug, warn};

/// Endpoint class a rate limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    Route,
    Analyze,
    Status,
}

type Key = (String, EndpointClass);

/// Sliding window limiter keyed by caller identity and endpoint class.
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    window: Duration,
    route_limit: u32,
    analyze_limit: u32,
    status_limit: u32,
    entries: DashMap<Key, VecDeque<Instant>>,
    last_sweep: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            window: Duration::from_secs(config.window_secs.max(1)),
            route_limit: config.route_per_window,
            analyze_limit: config.analyze_per_window,
            status_limit: config.status_per_window,
            entries: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// A limiter that admits everything.
    pub fn disabled() -> Self {
        Self::new(&RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        })
    }

    pub fn limit(&self, class: EndpointClass) -> u32 {
        match class {
            EndpointClass::Route => self.route_limit,
            EndpointClass::Analyze => self.analyze_limit,
            EndpointClass::Status => self.status_limit,
        }
    }

    /// Record a hit for `caller` on `class`, or refuse it.
    pub fn check(&self, caller: &str, class: EndpointClass) -> Result<(), TiergateError> {
        self.check_at(caller, class, Instant::now())
    }

    pub(crate) fn check_at(
        &self,
        caller: &str,
        class: EndpointClass,
        now: Instant,
    ) -> Result<(), TiergateError> {
        if !self.enabled {
            return Ok(());
        }
        // Sweep before taking an entry guard; `retain` locks every shard.
        self.sweep_if_due(now);

        let limit = self.limit(class);
        let window = self.window;

        let mut queue = self
            .entries
            .entry((caller.to_string(), class))
            .or_default();
        prune_queue(&mut queue, now, window);

        if queue.len() >= usize::try_from(limit).unwrap_or(usize::MAX) {
            let retry_after = queue
                .front()
                .map(|oldest| (*oldest + window).saturating_duration_since(now))
                .unwrap_or(window);
            // Round up to whole seconds, never below one.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            let retry_after = Duration::from_secs(secs.max(1));
            warn!(
                caller,
                endpoint = %class,
                limit,
                retry_after_secs = retry_after.as_secs(),
                "rate limit exceeded"
            );
            return Err(TiergateError::RateLimited {
                caller: caller.to_string(),
                endpoint: class.to_string(),
                retry_after,
            });
        }

        queue.push_back(now);
        Ok(())
    }

    fn sweep_if_due(&self, now: Instant) {
        let due = {
            let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if now.saturating_duration_since(*last) >= self.window {
                *last = now;
                true
            } else {
                false
            }
        };
        if due {
            self.prune_at(now);
        }
    }

    /// Drop expired entries and reclaim keys with no live entries.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub(crate) fn prune_at(&self, now: Instant) -> usize {
        let window = self.window;
        let before = self.entries.len();
        self.entries.retain(|_, queue| {
            prune_queue(queue, now, window);
            !queue.is_empty()
        });
        let reclaimed = before.saturating_sub(self.entries.len());
        if reclaimed > 0 {
            debug!(reclaimed, "rate limiter keys reclaimed");
        }
        reclaimed
    }

    /// Number of `(caller, class)` keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}

/// Remove entries at or before `now - window`.
fn prune_queue(queue: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = queue.front() {
        if now.saturating_duration_since(*oldest) >= window {
            queue.pop_front();
        } else {
            break;
        }
    }
}
