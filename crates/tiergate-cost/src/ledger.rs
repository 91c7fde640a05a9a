// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost ledger for persisting completed stages to SQLite.
//!
//! Each charged provider call is recorded with its tier, model, token
//! counts, and cost. Daily and monthly totals re-hydrate the budget tracker
//! after a restart. The same database holds the request log
//! (see [`crate::request_log`]).

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tiergate_core::{Tier, TiergateError, TokenUsage};
use tracing::debug;

use crate::request_log::REQUEST_LOG_SCHEMA;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cost_ledger (
    id TEXT PRIMARY KEY NOT NULL,
    request_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    tier TEXT NOT NULL,
    model TEXT NOT NULL,
    input_tokens INTEGER NOT NULL DEFAULT 0,
    output_tokens INTEGER NOT NULL DEFAULT 0,
    cost_usd REAL NOT NULL DEFAULT 0.0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cost_ledger_request ON cost_ledger(request_id);
CREATE INDEX IF NOT EXISTS idx_cost_ledger_created ON cost_ledger(created_at);";

/// Which stage of a routed request a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LedgerStage {
    /// Initial attempt at the selected tier.
    StageA,
    /// Escalated attempt one tier up.
    StageB,
}

/// A single cost record representing one completed provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    /// Unique record identifier (UUID v4).
    pub id: String,
    /// Routed request this call belonged to.
    pub request_id: String,
    pub stage: LedgerStage,
    pub tier: Tier,
    /// Model identifier used.
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Measured cost in USD.
    pub cost_usd: f64,
    /// ISO 8601 timestamp.
    pub created_at: String,
}

impl CostRecord {
    /// Create a new cost record stamped with the current time.
    pub fn new(
        request_id: String,
        stage: LedgerStage,
        tier: Tier,
        model: String,
        usage: &TokenUsage,
        cost_usd: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request_id,
            stage,
            tier,
            model,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd,
            created_at: chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
        }
    }
}

/// Convert a tokio-rusqlite error into TiergateError::Storage.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> TiergateError {
    TiergateError::Storage {
        source: Box::new(e),
    }
}

/// Persistent cost ledger backed by SQLite.
///
/// All operations go through the single tokio-rusqlite background thread.
#[derive(Clone)]
pub struct CostLedger {
    pub(crate) conn: tokio_rusqlite::Connection,
}

impl CostLedger {
    /// Wrap an existing connection and make sure the schema exists.
    pub async fn new(conn: tokio_rusqlite::Connection) -> Result<Self, TiergateError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            conn.execute_batch(REQUEST_LOG_SCHEMA)
        })
            .await
            .map_err(map_tr_err)?;
        Ok(Self { conn })
    }

    /// Open a cost ledger from a database file path, creating it if needed.
    pub async fn open(path: &str) -> Result<Self, TiergateError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| TiergateError::Storage {
                    source: Box::new(e),
                })?;
            }
        }
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| TiergateError::Storage {
                source: Box::new(e),
            })?;
        Self::new(conn).await
    }

    /// Open a throwaway in-memory ledger.
    pub async fn open_in_memory() -> Result<Self, TiergateError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| TiergateError::Storage {
                source: Box::new(e),
            })?;
        Self::new(conn).await
    }

    /// Record a cost entry in the ledger.
    pub async fn record(&self, record: &CostRecord) -> Result<(), TiergateError> {
        let row = record.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO cost_ledger (id, request_id, stage, tier, model, \
                     input_tokens, output_tokens, cost_usd, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        row.id,
                        row.request_id,
                        row.stage.to_string(),
                        row.tier.to_string(),
                        row.model,
                        row.input_tokens,
                        row.output_tokens,
                        row.cost_usd,
                        row.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        debug!(
            request_id = %record.request_id,
            stage = %record.stage,
            model = %record.model,
            cost_usd = record.cost_usd,
            "cost recorded"
        );

        Ok(())
    }

    /// Sum of costs for a given date (ISO 8601 date prefix, e.g. "2026-03-01").
    pub async fn daily_total(&self, date: &str) -> Result<f64, TiergateError> {
        let date = date.to_string();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0.0) FROM cost_ledger \
                     WHERE created_at >= ?1 AND created_at < date(?1, '+1 day')",
                    rusqlite::params![date],
                    |row| row.get::<_, f64>(0),
                )
            })
            .await
            .map_err(map_tr_err)
    }

    /// Sum of costs and number of distinct charged requests for a year-month
    /// (e.g. "2026-03").
    pub async fn monthly_totals(&self, year_month: &str) -> Result<(f64, u64), TiergateError> {
        let prefix = format!("{year_month}%");
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0.0), COUNT(DISTINCT request_id) FROM cost_ledger \
                     WHERE created_at LIKE ?1",
                    rusqlite::params![prefix],
                    |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)),
                )
            })
            .await
            .map(|(total, count)| (total, u64::try_from(count).unwrap_or(0)))
            .map_err(map_tr_err)
    }

    /// Sum of costs for one routed request, across its stages.
    pub async fn request_total(&self, request_id: &str) -> Result<f64, TiergateError> {
        let request_id = request_id.to_string();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0.0) FROM cost_ledger \
                     WHERE request_id = ?1",
                    rusqlite::params![request_id],
                    |row| row.get::<_, f64>(0),
                )
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(request_id: &str, cost_usd: f64, created_at: &str) -> CostRecord {
        CostRecord {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            stage: LedgerStage::StageA,
            tier: Tier::Mid,
            model: "gpt-4o".to_string(),
            input_tokens: 1000,
            output_tokens: 500,
            cost_usd,
            created_at: created_at.to_string(),
        }
    }

    #[tokio::test]
    async fn record_inserts_row() {
        let ledger = CostLedger::open_in_memory().await.unwrap();
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
        };
        let record = CostRecord::new(
            "req-1".to_string(),
            LedgerStage::StageB,
            Tier::High,
            "o1".to_string(),
            &usage,
            0.001,
        );
        ledger.record(&record).await.unwrap();

        let total = ledger.request_total("req-1").await.unwrap();
        assert!((total - 0.001).abs() < 1e-12);
    }

    #[tokio::test]
    async fn daily_total_sums_today() {
        let ledger = CostLedger::open_in_memory().await.unwrap();

        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let ts = format!("{today}T10:00:00.000Z");

        ledger.record(&sample_record("r1", 1.50, &ts)).await.unwrap();
        ledger.record(&sample_record("r2", 0.75, &ts)).await.unwrap();
        ledger
            .record(&sample_record("r3", 9.0, "2001-01-01T10:00:00.000Z"))
            .await
            .unwrap();

        let total = ledger.daily_total(&today).await.unwrap();
        assert!((total - 2.25).abs() < 1e-10, "expected 2.25, got {total}");
    }

    #[tokio::test]
    async fn monthly_totals_sum_and_count() {
        let ledger = CostLedger::open_in_memory().await.unwrap();

        let year_month = chrono::Utc::now().format("%Y-%m").to_string();
        let ts1 = format!("{year_month}-01T10:00:00.000Z");
        let ts2 = format!("{year_month}-15T10:00:00.000Z");

        ledger.record(&sample_record("r1", 2.0, &ts1)).await.unwrap();
        ledger.record(&sample_record("r1", 3.0, &ts2)).await.unwrap();
        ledger.record(&sample_record("r2", 1.0, &ts2)).await.unwrap();

        let (total, count) = ledger.monthly_totals(&year_month).await.unwrap();
        assert!((total - 6.0).abs() < 1e-10, "expected 6.0, got {total}");
        // Both stages of r1 count as one request.
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn file_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.db");
        let path = path.to_str().unwrap();

        let ledger = CostLedger::open(path).await.unwrap();
        ledger
            .record(&sample_record("r1", 4.0, "2026-03-01T10:00:00.000Z"))
            .await
            .unwrap();
        drop(ledger);

        let reopened = CostLedger::open(path).await.unwrap();
        assert!((reopened.request_total("r1").await.unwrap() - 4.0).abs() < 1e-10);
    }

    #[test]
    fn stage_display_and_parse() {
        use std::str::FromStr;
        assert_eq!(LedgerStage::StageA.to_string(), "stage_a");
        assert_eq!(LedgerStage::from_str("stage_b").unwrap(), LedgerStage::StageB);
    }
}
