// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette error bridge with fuzzy match suggestions.
//!
//! Turns figment extraction errors into miette diagnostics that point at the
//! offending key in the TOML source and offer a "did you mean?" correction.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a suggestion, e.g. `windw_secs` -> `window_secs`.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration error with rich diagnostic information.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// An unknown key was found in the configuration.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(tiergate::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        /// Dotted path of the unrecognized key, e.g. `tiers.low.modle`.
        key: String,
        /// Closest valid key, if one is similar enough.
        suggestion: Option<String>,
        /// Comma-separated valid keys for the table.
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A configuration value has the wrong type.
    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(tiergate::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
        #[label("wrong type here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A required configuration key is missing.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(tiergate::config::missing_key),
        help("add `{key} = <value>` to your tiergate.toml")
    )]
    MissingKey { key: String },

    /// A value deserialized fine but breaks a semantic constraint.
    #[error("validation error: {message}")]
    #[diagnostic(code(tiergate::config::validation))]
    Validation { message: String },

    /// Catch-all for other configuration errors.
    #[error("configuration error: {0}")]
    #[diagnostic(code(tiergate::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert a `figment::Error` (which may hold several errors) into diagnostics.
///
/// `toml_sources` pairs each loaded file path with its content so spans can be
/// resolved.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let table: Vec<String> = error.path.iter().map(|s| s.to_string()).collect();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let valid_keys: Vec<&str> = expected.to_vec();
                    let parent = unknown_field_table(&table, field);
                    let (span, src) = locate(&error, parent, field, toml_sources);
                    let mut key = parent.to_vec();
                    key.push(field.clone());
                    ConfigError::UnknownKey {
                        key: key.join("."),
                        suggestion: suggest_key(field, &valid_keys),
                        valid_keys: valid_keys.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => {
                    let mut key = table.clone();
                    key.push(field.to_string());
                    ConfigError::MissingKey { key: key.join(".") }
                }
                Kind::InvalidType(actual, expected) => {
                    let (span, src) = match table.split_last() {
                        Some((field, parent)) => locate(&error, parent, field, toml_sources),
                        None => (None, None),
                    };
                    ConfigError::InvalidType {
                        key: table.join("."),
                        detail: format!("found {actual}, expected {expected}"),
                        expected: expected.to_string(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Table that holds an unknown `field`.
///
/// Figment prefixes key errors with the offending key, so the path usually
/// ends in the field itself.
fn unknown_field_table<'a>(path: &'a [String], field: &str) -> &'a [String] {
    match path.split_last() {
        Some((last, parent)) if last == field => parent,
        _ => path,
    }
}

/// Resolve the source file and byte span of `field` inside `table`.
fn locate(
    error: &figment::error::Error,
    table: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let origin = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });

    // Inline sources carry no file metadata; fall back to the only source.
    let source = origin
        .and_then(|path| toml_sources.iter().find(|(p, _)| *p == path))
        .or_else(|| match toml_sources {
            [only] => Some(only),
            _ => None,
        });

    let Some((path, content)) = source else {
        return (None, None);
    };
    match find_key_offset(content, table, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(path, content.clone())),
        ),
        None => (None, None),
    }
}

/// Find the byte offset of `field` inside the TOML table named by `table`.
///
/// Nested tables are matched by their dotted header, so `["tiers", "low"]`
/// searches after `[tiers.low]`. An empty path searches from the start.
/// The search stops at the next table header.
pub fn find_key_offset(content: &str, table: &[String], field: &str) -> Option<usize> {
    let start = if table.is_empty() {
        0
    } else {
        let header = format!("[{}]", table.join("."));
        content.find(&header).map(|pos| pos + header.len())?
    };

    let mut offset = start;
    for line in content[start..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') && !table.is_empty() {
            return None;
        }
        if let Some(after) = trimmed.strip_prefix(field) {
            if after.starts_with([' ', '\t', '=']) {
                return Some(offset + (line.len() - trimmed.len()));
            }
        }
        offset += line.len();
    }
    None
}

/// Suggest the valid key most similar to `unknown`, if any clears the threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render a list of `ConfigError`s to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        let diagnostic: &dyn Diagnostic = error;
        if handler.render_report(&mut buf, diagnostic).is_ok() {
            eprint!("{buf}");
        } else {
            eprintln!("Error: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_window_secs_for_typo() {
        let valid = &["enabled", "window_secs", "route_per_window"];
        assert_eq!(
            suggest_key("windw_secs", valid),
            Some("window_secs".to_string())
        );
    }

    #[test]
    fn suggests_confidence_threshold() {
        let valid = &["confidence_threshold", "weights", "high_stakes"];
        assert_eq!(
            suggest_key("confidence_treshold", valid),
            Some("confidence_threshold".to_string())
        );
    }

    #[test]
    fn no_suggestion_for_distant_typo() {
        let valid = &["model", "min_score", "max_score"];
        assert_eq!(suggest_key("zzzzzz", valid), None);
    }

    #[test]
    fn finds_key_in_nested_table() {
        let content = "[tiers.mid]\nmodel = \"a\"\n\n[tiers.low]\nmodle = \"b\"\n";
        let table = vec!["tiers".to_string(), "low".to_string()];
        let offset = find_key_offset(content, &table, "modle").unwrap();
        assert_eq!(&content[offset..offset + 5], "modle");
    }

    #[test]
    fn unknown_field_table_drops_trailing_field() {
        let path = vec!["engine".to_string(), "log_levle".to_string()];
        assert_eq!(unknown_field_table(&path, "log_levle"), &path[..1]);
        let parent_only = vec!["engine".to_string()];
        assert_eq!(unknown_field_table(&parent_only, "log_levle"), &parent_only[..]);
        assert!(unknown_field_table(&[], "log_levle").is_empty());
    }

    #[test]
    fn unknown_key_in_inline_source_gets_a_span() {
        let content = "[rate_limit]\nwindw_secs = 30\n";
        let errors = crate::load_and_validate_str(content).unwrap_err();
        match &errors[0] {
            ConfigError::UnknownKey { key, span, .. } => {
                assert_eq!(key, "rate_limit.windw_secs");
                let span = span.expect("span should resolve");
                assert_eq!(span.offset(), "[rate_limit]\n".len());
                assert_eq!(span.len(), "windw_secs".len());
            }
            other => panic!("expected UnknownKey, got {other:?}"),
        }
    }

    #[test]
    fn key_search_stops_at_next_table() {
        let content = "[engine]\nlog_level = \"info\"\n[retry]\nmax_attempts = 3\n";
        let table = vec!["engine".to_string()];
        assert_eq!(find_key_offset(content, &table, "max_attempts"), None);
    }
}
