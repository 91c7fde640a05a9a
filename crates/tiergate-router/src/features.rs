// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Feature extraction over raw request text.
//!
//! Pure and deterministic: the same text always yields the same
//! [`RequestFeatures`]. No LLM pre-call, no network, no latency.

use std::collections::{BTreeMap, BTreeSet};

use regex::{Captures, Regex, RegexBuilder};
use serde::Serialize;
use tiergate_core::TiergateError;

/// Signals derived once per request. Immutable after extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestFeatures {
    /// Fenced or inline code is present.
    pub contains_code: bool,
    /// Number of questions; a run of `?` counts once.
    pub question_count: usize,
    /// At least one high-stakes keyword class matched.
    pub has_high_stakes_terms: bool,
    /// Names of the matched high-stakes keyword classes.
    pub high_stakes_classes: BTreeSet<String>,
    /// Tokens with at least one alphanumeric character, list markers excluded.
    pub word_count: usize,
    /// List items at line start plus inline step/part markers.
    pub list_or_structure_count: usize,
    /// A stack trace or runtime error dump is present.
    pub has_stack_trace: bool,
    /// Proof, optimization, or correctness vocabulary.
    pub hard_reasoning: bool,
    /// The caller demands an exact output format.
    pub strict_format: bool,
    /// The answer depends on recent information.
    pub freshness_need: bool,
    /// Length in characters.
    pub char_count: usize,
}

impl RequestFeatures {
    /// Several questions or several structured parts.
    pub fn is_multi_part(&self) -> bool {
        self.question_count >= 3 || self.list_or_structure_count >= 2
    }

    /// Names of the boolean signals that are set, in a stable order.
    pub fn active_flags(&self) -> Vec<&'static str> {
        [
            ("contains_code", self.contains_code),
            ("high_stakes", self.has_high_stakes_terms),
            ("stack_trace", self.has_stack_trace),
            ("hard_reasoning", self.hard_reasoning),
            ("strict_format", self.strict_format),
            ("freshness_need", self.freshness_need),
            ("multi_part", self.is_multi_part()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

const LIST_MARKER: &str = r"(?m)^[ \t]*(?:[-*+•]|\d{1,3}[.)]|[A-Za-z]\))[ \t]+";

const INLINE_STRUCTURE: &str = r"(?i)\b(?:step|part|phase)\s*\d+\b|\b(?:firstly|secondly|thirdly|finally)\b|(?:^|\s)\(?\d{1,2}\)\s*\w";

const INLINE_CODE: &str = r"`[^`\n]+`";

const STACK_TRACE: &[&str] = &[
    r"(?i)traceback \(most recent call last\)",
    r"(?i)\bstack\s*trace\b",
    r"\b[A-Z][A-Za-z]*(?:Exception|Error)\b:",
    r"(?i)\bsegmentation\s*fault\b|\bsegfault\b",
    r"(?i)\berror\s+at\s+line\s+\d+",
    r"\bat\s+[\w.$]+\([\w.]+:\d+\)",
    r#"File\s+"[^"]+",\s*line\s+\d+"#,
    r"panicked at",
];

const HARD_REASONING: &str = r"(?i)\b(?:prove|derive|optimi[sz]e|complexity|edge\s*cases?|correctness|architecture|formal|theorem|proof|mathematically|guarantee|invariant|verify|validate|constraints?)\b";

const STRICT_FORMAT: &str = r"(?i)\bjson\b|\bschema\b|exact\s*format|strict\s*format|only\s*output|output\s*only|respond\s*only\s*with|return\s*only|must\s*validate|\brfc\s*\d*\b";

const FRESHNESS: &str = r"(?i)\b(?:latest|today|current|currently|recently|right\s*now|this\s*(?:week|month|year)|up\s*to\s*date|20[2-3]\d)\b";

/// Compiles the signal patterns and the configured keyword classes once.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    list_marker: Regex,
    inline_structure: Regex,
    inline_code: Regex,
    stack_trace: Vec<Regex>,
    hard_reasoning: Regex,
    strict_format: Regex,
    freshness: Regex,
    high_stakes: Vec<(String, Regex)>,
}

fn compile(pattern: &str) -> Result<Regex, TiergateError> {
    Regex::new(pattern).map_err(|e| TiergateError::Internal(format!("bad pattern: {e}")))
}

/// Build one case-insensitive regex matching any keyword of a class as a
/// whole word or phrase. Whitespace inside a phrase matches any whitespace run.
fn keyword_class(class: &str, keywords: &[String]) -> Result<Regex, TiergateError> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| {
            k.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect();
    if alternatives.is_empty() {
        return Err(TiergateError::Config(format!(
            "high-stakes class `{class}` has no keywords"
        )));
    }
    RegexBuilder::new(&format!(r"\b(?:{})\b", alternatives.join("|")))
        .case_insensitive(true)
        .build()
        .map_err(|e| TiergateError::Config(format!("high-stakes class `{class}`: {e}")))
}

impl FeatureExtractor {
    /// Create an extractor for the given high-stakes keyword classes.
    pub fn new(high_stakes: &BTreeMap<String, Vec<String>>) -> Result<Self, TiergateError> {
        let high_stakes = high_stakes
            .iter()
            .map(|(class, words)| Ok((class.clone(), keyword_class(class, words)?)))
            .collect::<Result<Vec<_>, TiergateError>>()?;

        Ok(Self {
            list_marker: compile(LIST_MARKER)?,
            inline_structure: compile(INLINE_STRUCTURE)?,
            inline_code: compile(INLINE_CODE)?,
            stack_trace: STACK_TRACE
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_, _>>()?,
            hard_reasoning: compile(HARD_REASONING)?,
            strict_format: compile(STRICT_FORMAT)?,
            freshness: compile(FRESHNESS)?,
            high_stakes,
        })
    }

    /// Derive the features of `text`. Empty text yields all-zero features.
    pub fn extract(&self, text: &str) -> RequestFeatures {
        if text.trim().is_empty() {
            return RequestFeatures::default();
        }

        let list_items = self.list_marker.find_iter(text).count();
        let stripped = self.list_marker.replace_all(text, "");
        let inline_markers = self.inline_structure.find_iter(&stripped).count();
        // The numbered form also matches the first letter of the next word.
        let stripped = self
            .inline_structure
            .replace_all(&stripped, |caps: &Captures<'_>| match caps[0].rfind(')') {
                Some(close) => format!(" {}", caps[0][close + 1..].trim_start()),
                None => " ".to_string(),
            });

        let word_count = stripped
            .split_whitespace()
            .filter(|token| token.chars().any(char::is_alphanumeric))
            .count();

        let high_stakes_classes: BTreeSet<String> = self
            .high_stakes
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(class, _)| class.clone())
            .collect();

        RequestFeatures {
            contains_code: text.contains("```") || self.inline_code.is_match(text),
            question_count: count_question_runs(text),
            has_high_stakes_terms: !high_stakes_classes.is_empty(),
            high_stakes_classes,
            word_count,
            list_or_structure_count: list_items + inline_markers,
            has_stack_trace: self.stack_trace.iter().any(|re| re.is_match(text)),
            hard_reasoning: self.hard_reasoning.is_match(text),
            strict_format: self.strict_format.is_match(text),
            freshness_need: self.freshness.is_match(text),
            char_count: text.chars().count(),
        }
    }
}

fn count_question_runs(text: &str) -> usize {
    let mut count = 0;
    let mut in_run = false;
    for c in text.chars() {
        if c == '?' {
            if !in_run {
                count += 1;
            }
            in_run = true;
        } else {
            in_run = false;
        }
    }
    count
}
