// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./tiergate.toml` > `~/.config/tiergate/tiergate.toml` > `/etc/tiergate/tiergate.toml`
//! with environment variable overrides via `TIERGATE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TiergateConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tiergate/tiergate.toml` (system-wide)
/// 3. `~/.config/tiergate/tiergate.toml` (user XDG config)
/// 4. `./tiergate.toml` (local directory)
/// 5. `TIERGATE_*` environment variables
pub fn load_config() -> Result<TiergateConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string layered over the defaults only.
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<TiergateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TiergateConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TiergateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TiergateConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(TiergateConfig::default()))
        .merge(Toml::file("/etc/tiergate/tiergate.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("tiergate/tiergate.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("tiergate.toml"))
        .merge(env_provider())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config key.
///
/// Uses explicit section prefixes rather than splitting on `_`, because key
/// names contain underscores: `TIERGATE_RATE_LIMIT_WINDOW_SECS` must map to
/// `rate_limit.window_secs`. Tier keys carry two levels:
/// `TIERGATE_TIERS_LOW_MODEL` maps to `tiers.low.model`.
pub fn map_env_key(key: &str) -> String {
    const SECTIONS: &[&str] = &[
        "engine_",
        "cost_",
        "rate_limit_",
        "retry_",
        "provider_",
        "storage_",
    ];

    if let Some(rest) = key.strip_prefix("tiers_") {
        for tier in ["low_", "mid_", "high_"] {
            if let Some(field) = rest.strip_prefix(tier) {
                return format!("tiers.{}.{field}", tier.trim_end_matches('_'));
            }
        }
        return format!("tiers.{rest}");
    }

    if let Some(rest) = key.strip_prefix("routing_") {
        if let Some(field) = rest.strip_prefix("weights_") {
            return format!("routing.weights.{field}");
        }
        return format!("routing.{rest}");
    }

    for section in SECTIONS {
        if let Some(field) = key.strip_prefix(section) {
            return format!("{}.{field}", section.trim_end_matches('_'));
        }
    }

    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("TIERGATE_").map(|key| map_env_key(key.as_str()).into())
}
