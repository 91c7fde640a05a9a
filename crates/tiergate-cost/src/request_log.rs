// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-request outcome log and the statistics computed from it.
//!
//! The cost ledger holds one row per charged provider call. The request log
//! holds one row per routed request, successful or not, and lives in the
//! same database.

use serde::{Deserialize, Serialize};
use tiergate_core::{Tier, TiergateError};
use tracing::debug;

use crate::ledger::{CostLedger, map_tr_err};

pub(crate) const REQUEST_LOG_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS request_log (
    request_id TEXT PRIMARY KEY NOT NULL,
    caller TEXT NOT NULL,
    success INTEGER NOT NULL,
    status_code INTEGER NOT NULL,
    error_kind TEXT,
    error TEXT,
    score INTEGER,
    initial_tier TEXT,
    final_tier TEXT,
    final_model TEXT,
    escalated INTEGER NOT NULL DEFAULT 0,
    forced INTEGER NOT NULL DEFAULT 0,
    streamed INTEGER NOT NULL DEFAULT 0,
    stage_count INTEGER NOT NULL DEFAULT 0,
    input_tokens INTEGER NOT NULL DEFAULT 0,
    output_tokens INTEGER NOT NULL DEFAULT 0,
    cost_usd REAL NOT NULL DEFAULT 0.0,
    latency_ms INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_request_log_created ON request_log(created_at);";

/// Most recent requests listed in [`RequestStatistics::recent`].
pub const RECENT_REQUESTS: usize = 10;

/// Outcome of one routed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub request_id: String,
    pub caller: String,
    pub success: bool,
    /// 200 on success, else the status of the error.
    pub status_code: u16,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    /// `None` when the request failed before scoring.
    pub score: Option<u8>,
    pub initial_tier: Option<Tier>,
    /// Tier that produced the answer, or the last tier attempted.
    pub final_tier: Option<Tier>,
    pub final_model: Option<String>,
    pub escalated: bool,
    pub forced: bool,
    pub streamed: bool,
    /// Provider calls made, including failed ones.
    pub stage_count: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
    /// ISO 8601 timestamp.
    pub created_at: String,
}

impl RequestLogEntry {
    pub fn total_tokens(&self) -> u64 {
        u64::from(self.input_tokens) + u64::from(self.output_tokens)
    }
}

/// Aggregates over a window of the most recent requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestStatistics {
    /// Requests in the window.
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Percent of requests that succeeded.
    pub success_rate: f64,
    /// Percent of requests that escalated to Stage B.
    pub escalation_rate: f64,
    pub avg_latency_ms: f64,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    /// Newest first, at most [`RECENT_REQUESTS`].
    pub recent: Vec<RequestLogEntry>,
}

impl RequestStatistics {
    /// Aggregate `entries`, newest first.
    pub fn from_entries(mut entries: Vec<RequestLogEntry>) -> Self {
        let total = entries.len() as u64;
        let successful = entries.iter().filter(|e| e.success).count() as u64;
        let escalated = entries.iter().filter(|e| e.escalated).count() as u64;
        let percent = |n: u64| {
            if total == 0 {
                0.0
            } else {
                n as f64 / total as f64 * 100.0
            }
        };
        let avg_latency_ms = if total == 0 {
            0.0
        } else {
            entries.iter().map(|e| e.latency_ms as f64).sum::<f64>() / total as f64
        };
        let total_cost_usd = entries.iter().map(|e| e.cost_usd).sum();
        let total_tokens = entries.iter().map(RequestLogEntry::total_tokens).sum();
        entries.truncate(RECENT_REQUESTS);

        Self {
            total_requests: total,
            successful_requests: successful,
            failed_requests: total - successful,
            success_rate: percent(successful),
            escalation_rate: percent(escalated),
            avg_latency_ms,
            total_cost_usd,
            total_tokens,
            recent: entries,
        }
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RequestLogEntry> {
    let tier = |idx: usize| -> rusqlite::Result<Option<Tier>> {
        Ok(row
            .get::<_, Option<String>>(idx)?
            .and_then(|s| s.parse().ok()))
    };
    Ok(RequestLogEntry {
        request_id: row.get(0)?,
        caller: row.get(1)?,
        success: row.get(2)?,
        status_code: row.get(3)?,
        error_kind: row.get(4)?,
        error: row.get(5)?,
        score: row.get(6)?,
        initial_tier: tier(7)?,
        final_tier: tier(8)?,
        final_model: row.get(9)?,
        escalated: row.get(10)?,
        forced: row.get(11)?,
        streamed: row.get(12)?,
        stage_count: row.get(13)?,
        input_tokens: row.get(14)?,
        output_tokens: row.get(15)?,
        cost_usd: row.get(16)?,
        latency_ms: row.get::<_, i64>(17).map(|ms| u64::try_from(ms).unwrap_or(0))?,
        created_at: row.get(18)?,
    })
}

impl CostLedger {
    /// Append one request outcome. A repeated request id replaces its row.
    pub async fn log_request(&self, entry: &RequestLogEntry) -> Result<(), TiergateError> {
        let row = entry.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO request_log (request_id, caller, success, \
                     status_code, error_kind, error, score, initial_tier, final_tier, \
                     final_model, escalated, forced, streamed, stage_count, input_tokens, \
                     output_tokens, cost_usd, latency_ms, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
                     ?15, ?16, ?17, ?18, ?19)",
                    rusqlite::params![
                        row.request_id,
                        row.caller,
                        row.success,
                        row.status_code,
                        row.error_kind,
                        row.error,
                        row.score,
                        row.initial_tier.map(|t| t.to_string()),
                        row.final_tier.map(|t| t.to_string()),
                        row.final_model,
                        row.escalated,
                        row.forced,
                        row.streamed,
                        row.stage_count,
                        row.input_tokens,
                        row.output_tokens,
                        row.cost_usd,
                        i64::try_from(row.latency_ms).unwrap_or(i64::MAX),
                        row.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        debug!(
            request_id = %entry.request_id,
            success = entry.success,
            "request logged"
        );
        Ok(())
    }

    /// The `limit` most recent request outcomes, newest first.
    pub async fn recent_requests(&self, limit: usize) -> Result<Vec<RequestLogEntry>, TiergateError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT request_id, caller, success, status_code, error_kind, error, \
                     score, initial_tier, final_tier, final_model, escalated, forced, \
                     streamed, stage_count, input_tokens, output_tokens, cost_usd, \
                     latency_ms, created_at \
                     FROM request_log ORDER BY created_at DESC, rowid DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(rusqlite::params![limit], entry_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await
            .map_err(map_tr_err)
    }

    /// Statistics over the `limit` most recent requests.
    pub async fn statistics(&self, limit: usize) -> Result<RequestStatistics, TiergateError> {
        Ok(RequestStatistics::from_entries(
            self.recent_requests(limit).await?,
        ))
    }
}
