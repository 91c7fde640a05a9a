// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tiergate config` command implementation.

use tiergate_config::TiergateConfig;
use tiergate_core::TiergateError;

const REDACTED: &str = "<redacted>";

/// Render the effective configuration as TOML with secrets masked.
pub fn render(config: &TiergateConfig) -> Result<String, TiergateError> {
    let mut shown = config.clone();
    if shown.provider.api_key.is_some() {
        shown.provider.api_key = Some(REDACTED.to_string());
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| TiergateError::Internal(format!("failed to render config: {e}")))
}

/// Run the `tiergate config` command. Loading already validated the config.
pub fn run_config(config: &TiergateConfig) -> Result<(), TiergateError> {
    eprintln!("configuration is valid");
    print!("{}", render(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_masked() {
        let mut config = TiergateConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        let out = render(&config).unwrap();
        assert!(!out.contains("sk-secret"));
        assert!(out.contains(REDACTED));
    }

    #[test]
    fn rendered_config_loads_back() {
        let out = render(&TiergateConfig::default()).unwrap();
        let config = tiergate_config::load_and_validate_str(&out).unwrap();
        assert_eq!(config.tiers.high.model, "o1");
        assert_eq!(config.rate_limit.route_per_window, TiergateConfig::default().rate_limit.route_per_window);
    }
}
