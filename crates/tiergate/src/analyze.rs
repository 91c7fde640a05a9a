// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tiergate analyze` command implementation.

use serde::Serialize;
use tiergate_config::TiergateConfig;
use tiergate_core::TiergateError;
use tiergate_engine::sanitize;
use tiergate_router::{Analysis, Router};

/// Analysis plus the model the tier maps to.
#[derive(Debug, Serialize)]
pub struct AnalyzeReport {
    #[serde(flatten)]
    pub analysis: Analysis,
    pub model: String,
    pub self_eval: bool,
}

pub fn analyze(config: &TiergateConfig, text: &str) -> Result<AnalyzeReport, TiergateError> {
    let router = Router::new(&config.routing, &config.tiers)?;
    let analysis = router.analyze(&sanitize(text));
    let definition = router.definition(&analysis);
    Ok(AnalyzeReport {
        model: definition.model.clone(),
        self_eval: definition.self_eval_enabled,
        analysis,
    })
}

/// Run the `tiergate analyze` command. Makes no provider call.
pub fn run_analyze(config: &TiergateConfig, text: &str, json: bool) -> Result<(), TiergateError> {
    let report = analyze(config, text)?;

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| TiergateError::Internal(format!("failed to encode analysis: {e}")))?;
        println!("{out}");
        return Ok(());
    }

    let breakdown = &report.analysis.breakdown;
    println!("tier:      {} ({})", report.analysis.tier, report.model);
    println!("score:     {}", breakdown.score);
    if breakdown.hard_triggered {
        let reasons: Vec<&str> = breakdown.trigger_reasons.iter().map(String::as_str).collect();
        println!("triggered: {}", reasons.join(", "));
    }
    for (reason, points) in &breakdown.bonuses {
        println!("  +{points:<3} {reason}");
    }
    let flags = report.analysis.features.active_flags();
    if !flags.is_empty() {
        println!("features:  {}", flags.join(", "));
    }
    Ok(())
}
