// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! tiergate - cost-aware LLM tier routing.
//!
//! This is the binary entry point: it loads configuration, installs the
//! tracing subscriber, and dispatches to one subcommand.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod analyze;
mod config_cmd;
mod route;
mod shutdown;
mod stats;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tiergate_config::TiergateConfig;
use tiergate_core::Tier;

/// tiergate - route each request to the cheapest adequate model tier.
#[derive(Parser, Debug)]
#[command(name = "tiergate", version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Score a request and show the tier it would use. No provider call.
    Analyze {
        /// Request text; read from stdin when omitted.
        text: Option<String>,
        /// Print the analysis as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Route a request through the provider.
    Route {
        /// Request text; read from stdin when omitted.
        text: Option<String>,
        /// Caller identity for rate limiting.
        #[arg(long, default_value = tiergate_engine::ANONYMOUS_CALLER)]
        caller: String,
        /// Output token cap for this request.
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Stream the answer as it is generated. Disables escalation.
        #[arg(long)]
        stream: bool,
        /// Skip scoring and run at this tier (low, mid, high) without
        /// self-evaluation or escalation.
        #[arg(long)]
        tier: Option<Tier>,
        /// Print the full routing result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show budget usage for the current period.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Summarize recent requests from the request log.
    Stats {
        /// Number of most recent requests to aggregate.
        #[arg(long, default_value_t = stats::DEFAULT_STATS_LIMIT)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration and print the effective values.
    Config,
}

fn load_config(path: Option<&PathBuf>) -> TiergateConfig {
    let loaded = match path {
        Some(path) => tiergate_config::load_and_validate_path(path),
        None => tiergate_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            tiergate_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
/// Logs go to stderr so answers on stdout stay clean.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tiergate={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Request text from the argument, or all of stdin.
fn request_text(arg: Option<String>) -> std::io::Result<String> {
    match arg {
        Some(text) => Ok(text),
        None => std::io::read_to_string(std::io::stdin()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());
    init_tracing(&config.engine.log_level);

    let outcome = match cli.command {
        Commands::Analyze { text, json } => match request_text(text) {
            Ok(text) => analyze::run_analyze(&config, &text, json),
            Err(e) => Err(stdin_error(e)),
        },
        Commands::Route {
            text,
            caller,
            max_tokens,
            stream,
            tier,
            json,
        } => match request_text(text) {
            Ok(text) => {
                let options = route::RouteOptions {
                    caller,
                    max_tokens,
                    stream,
                    tier,
                    json,
                };
                route::run_route(&config, text, options).await
            }
            Err(e) => Err(stdin_error(e)),
        },
        Commands::Status { json } => status::run_status(&config, json).await,
        Commands::Stats { limit, json } => stats::run_stats(&config, limit, json).await,
        Commands::Config => config_cmd::run_config(&config),
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn stdin_error(e: std::io::Error) -> tiergate_core::TiergateError {
    tiergate_core::TiergateError::Validation {
        message: format!("failed to read request text from stdin: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc supports advancing the epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn default_config_is_valid() {
        let config = tiergate_config::load_and_validate_str("").expect("defaults should validate");
        assert_eq!(config.routing.confidence_threshold, 0.75);
        assert_eq!(config.engine.log_level, "info");
    }

    #[test]
    fn route_flags_parse() {
        let cli = Cli::try_parse_from([
            "tiergate",
            "route",
            "What is 2+2?",
            "--caller",
            "alice",
            "--max-tokens",
            "200",
            "--stream",
        ])
        .unwrap();
        match cli.command {
            Commands::Route {
                text,
                caller,
                max_tokens,
                stream,
                tier,
                json,
            } => {
                assert_eq!(text.as_deref(), Some("What is 2+2?"));
                assert_eq!(caller, "alice");
                assert_eq!(max_tokens, Some(200));
                assert!(stream);
                assert_eq!(tier, None);
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn caller_defaults_to_anonymous_and_config_flag_is_global() {
        let cli = Cli::try_parse_from(["tiergate", "route", "hi", "--config", "/tmp/t.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/t.toml")));
        let Commands::Route { caller, .. } = cli.command else {
            panic!("expected route");
        };
        assert_eq!(caller, "anonymous");
    }

    #[test]
    fn tier_flag_pins_a_tier() {
        let cli = Cli::try_parse_from(["tiergate", "route", "hi", "--tier", "high"]).unwrap();
        let Commands::Route { tier, .. } = cli.command else {
            panic!("expected route");
        };
        assert_eq!(tier, Some(Tier::High));
        assert!(Cli::try_parse_from(["tiergate", "route", "hi", "--tier", "huge"]).is_err());
    }

    #[test]
    fn stats_limit_defaults() {
        let cli = Cli::try_parse_from(["tiergate", "stats"]).unwrap();
        let Commands::Stats { limit, json } = cli.command else {
            panic!("expected stats");
        };
        assert_eq!(limit, stats::DEFAULT_STATS_LIMIT);
        assert!(!json);
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["tiergate"]).is_err());
    }
}
