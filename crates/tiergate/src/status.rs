// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tiergate status` command implementation.
//!
//! Reads the cost ledger and reports spend against the configured ceilings.

use tiergate_config::TiergateConfig;
use tiergate_core::{BudgetStatus, BudgetStore, TiergateError};
use tiergate_cost::{BudgetTracker, CostLedger};

/// Budget status as re-hydrated from the ledger.
pub async fn budget_status(config: &TiergateConfig) -> Result<BudgetStatus, TiergateError> {
    let tracker = if config.cost.ledger_enabled {
        let ledger = CostLedger::open(&config.storage.database_path).await?;
        BudgetTracker::from_ledger(&config.cost, &ledger).await?
    } else {
        BudgetTracker::new(&config.cost)
    };
    Ok(tracker.status())
}

fn usd(value: Option<f64>) -> String {
    value.map_or_else(|| "unlimited".to_string(), |v| format!("${v:.2}"))
}

/// Run the `tiergate status` command.
pub async fn run_status(config: &TiergateConfig, json: bool) -> Result<(), TiergateError> {
    let status = budget_status(config).await?;

    if json {
        let out = serde_json::to_string_pretty(&status)
            .map_err(|e| TiergateError::Internal(format!("failed to encode status: {e}")))?;
        println!("{out}");
        return Ok(());
    }

    if !config.cost.ledger_enabled {
        eprintln!("note: cost ledger disabled, totals cover this process only");
    }
    println!("period:     {}", status.period);
    println!(
        "monthly:    ${:.4} of {} ({:.1}%)",
        status.spent_usd,
        usd(status.monthly_limit_usd),
        status.percentage_used
    );
    println!(
        "today:      ${:.4} of {}",
        status.daily_spent_usd,
        usd(status.daily_limit_usd)
    );
    println!("remaining:  {}", usd(status.remaining_usd));
    println!("requests:   {}", status.request_count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiergate_core::{Tier, TokenUsage};
    use tiergate_cost::{CostRecord, LedgerStage};

    #[tokio::test]
    async fn status_reads_ledger_totals() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TiergateConfig::default();
        config.storage.database_path = dir.path().join("s.db").to_string_lossy().into_owned();

        let ledger = CostLedger::open(&config.storage.database_path).await.unwrap();
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 100,
        };
        ledger
            .record(&CostRecord::new(
                "r1".into(),
                LedgerStage::StageA,
                Tier::Low,
                "gpt-4o-mini".into(),
                &usage,
                2.5,
            ))
            .await
            .unwrap();
        drop(ledger);

        let status = budget_status(&config).await.unwrap();
        assert!((status.spent_usd - 2.5).abs() < 1e-12);
        assert_eq!(status.request_count, 1);
        assert_eq!(status.monthly_limit_usd, Some(100.0));
        assert!((status.remaining_usd.unwrap() - 97.5).abs() < 1e-12);
    }

    #[test]
    fn unlimited_ceiling_formats() {
        assert_eq!(usd(None), "unlimited");
        assert_eq!(usd(Some(5.0)), "$5.00");
    }
}
