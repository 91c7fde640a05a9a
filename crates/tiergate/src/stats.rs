// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tiergate stats` command implementation.
//!
//! Summarizes the most recent entries of the request log kept next to the
//! cost ledger.

use std::fmt::Write;

use tiergate_config::TiergateConfig;
use tiergate_core::TiergateError;
use tiergate_cost::{CostLedger, RequestStatistics};

/// Window used when `--limit` is not given.
pub const DEFAULT_STATS_LIMIT: usize = 100;

/// Run the `tiergate stats` command.
pub async fn run_stats(
    config: &TiergateConfig,
    limit: usize,
    json: bool,
) -> Result<(), TiergateError> {
    if !config.cost.ledger_enabled {
        return Err(TiergateError::Config(
            "request statistics need the ledger; set cost.ledger_enabled = true".into(),
        ));
    }
    let ledger = CostLedger::open(&config.storage.database_path).await?;
    let stats = ledger.statistics(limit).await?;

    if json {
        let out = serde_json::to_string_pretty(&stats)
            .map_err(|e| TiergateError::Internal(format!("failed to encode stats: {e}")))?;
        println!("{out}");
    } else {
        print!("{}", render(&stats));
    }
    Ok(())
}

/// Human-readable report.
pub fn render(stats: &RequestStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "requests:   {} ({} ok, {} failed, {:.1}% success)",
        stats.total_requests, stats.successful_requests, stats.failed_requests, stats.success_rate
    );
    let _ = writeln!(out, "escalated:  {:.1}%", stats.escalation_rate);
    let _ = writeln!(out, "latency:    {:.0}ms average", stats.avg_latency_ms);
    let _ = writeln!(
        out,
        "spend:      ${:.4} over {} tokens",
        stats.total_cost_usd, stats.total_tokens
    );
    if stats.recent.is_empty() {
        return out;
    }

    let _ = writeln!(out, "recent:");
    for entry in &stats.recent {
        let tier = entry
            .final_tier
            .map_or_else(|| "-".to_string(), |t| t.to_string());
        let outcome = if entry.success {
            "ok".to_string()
        } else {
            entry.status_code.to_string()
        };
        let _ = writeln!(
            out,
            "  {} {:<4} {:<6} score={:<3} {}{}${:.6} {}ms",
            entry.created_at,
            outcome,
            tier,
            entry.score.map_or_else(|| "-".to_string(), |s| s.to_string()),
            if entry.escalated { "escalated " } else { "" },
            if entry.forced { "forced " } else { "" },
            entry.cost_usd,
            entry.latency_ms,
        );
    }
    out
}
