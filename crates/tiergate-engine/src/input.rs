// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request text sanitization and limit checks.
//!
//! Formatting is preserved so pasted code survives intact: tabs, newlines,
//! quotes, and backticks pass through. Only line endings are normalized and
//! other control characters dropped.

use tiergate_config::model::EngineConfig;
use tiergate_core::TiergateError;

/// Limits applied before a request reaches the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLimits {
    pub max_prompt_chars: usize,
    pub default_output_tokens: u32,
    pub max_output_tokens_limit: u32,
}

impl From<&EngineConfig> for InputLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_prompt_chars: config.max_prompt_chars,
            default_output_tokens: config.default_output_tokens,
            max_output_tokens_limit: config.max_output_tokens_limit,
        }
    }
}

impl Default for InputLimits {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Text and output cap that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedInput {
    pub text: String,
    pub max_output_tokens: u32,
}

/// Normalize CRLF and CR to LF and drop control characters other than tab
/// and newline.
pub fn sanitize(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n'))
        .collect()
}

impl InputLimits {
    /// Sanitize `text` and check it and the requested output cap.
    ///
    /// `max_output_tokens` of `None` falls back to the configured default.
    pub fn validate(
        &self,
        text: &str,
        max_output_tokens: Option<u32>,
    ) -> Result<ValidatedInput, TiergateError> {
        let text = sanitize(text);

        if text.trim().is_empty() {
            return Err(validation("text must not be empty"));
        }

        let chars = text.chars().count();
        if chars > self.max_prompt_chars {
            return Err(validation(format!(
                "text too long: {chars} characters (max {})",
                self.max_prompt_chars
            )));
        }

        let max_output_tokens = max_output_tokens.unwrap_or(self.default_output_tokens);
        if max_output_tokens == 0 || max_output_tokens > self.max_output_tokens_limit {
            return Err(validation(format!(
                "max_output_tokens must be between 1 and {}, got {max_output_tokens}",
                self.max_output_tokens_limit
            )));
        }

        Ok(ValidatedInput {
            text,
            max_output_tokens,
        })
    }
}

fn validation(message: impl Into<String>) -> TiergateError {
    TiergateError::Validation {
        message: message.into(),
    }
}
