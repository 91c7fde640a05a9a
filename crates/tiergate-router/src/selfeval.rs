// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Self-evaluation instructions and the tolerant parser for model replies.
//!
//! Stage A asks the model to end its answer with one machine-readable line:
//!
//! ```text
//! SELF_EVAL: {"confidence": 0.82, "should_escalate": false, "reasons": []}
//! ```
//!
//! A reply that is a single JSON object with `answer` and `confidence` keys is
//! accepted too. Anything else parses to `None`, which never escalates.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::features::RequestFeatures;
use crate::scoring::ScoreBreakdown;

/// Marker that starts the trailing self-evaluation line.
pub const SELF_EVAL_MARKER: &str = "SELF_EVAL:";

/// Most Stage A reasons forwarded into the Stage B context.
const MAX_FORWARDED_REASONS: usize = 3;

/// System instruction for a Stage A call with self-evaluation.
pub const SELF_EVAL_INSTRUCTION: &str = "\
Answer the user's request directly and completely.

After your answer, add exactly one final line in this format:
SELF_EVAL: {\"confidence\": <number from 0 to 1>, \"should_escalate\": <true|false>, \"reasons\": [<short strings>]}

Use confidence 0.9 to 1.0 only for clear factual knowledge, 0.7 to 0.9 when fairly sure, \
and below 0.7 when guessing or uncertain. Set should_escalate to true when information is \
missing, the request is ambiguous, the reasoning is long enough that you may have erred, \
the topic is high-stakes, or you cannot meet a required output format.";

/// A model's assessment of its own answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfEvaluation {
    /// Confidence clamped to `[0, 1]`.
    pub confidence: f64,
    /// The model recommends a stronger tier.
    pub escalate: bool,
    pub reasons: Vec<String>,
}

impl SelfEvaluation {
    /// Escalate when the model asks for it or confidence is strictly below
    /// `threshold`.
    pub fn should_escalate(&self, threshold: f64) -> bool {
        self.escalate || self.confidence < threshold
    }
}

/// A Stage A reply split into the user-facing answer and the evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    /// Answer text with the self-evaluation removed.
    pub answer: String,
    /// `None` when no usable self-evaluation was found.
    pub evaluation: Option<SelfEvaluation>,
}

#[derive(Deserialize)]
struct RawEvaluation {
    confidence: Value,
    #[serde(default)]
    should_escalate: Option<Value>,
    #[serde(default)]
    reasons: Option<Value>,
    #[serde(default)]
    answer: Option<String>,
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn reasons(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    }
}

fn evaluation(raw: &str) -> Option<(SelfEvaluation, Option<String>)> {
    let raw: RawEvaluation = serde_json::from_str(raw.trim()).ok()?;
    let confidence = number(&raw.confidence)?;
    if !confidence.is_finite() {
        return None;
    }
    Some((
        SelfEvaluation {
            confidence: confidence.clamp(0.0, 1.0),
            escalate: flag(raw.should_escalate.as_ref()),
            reasons: reasons(raw.reasons),
        },
        raw.answer,
    ))
}

/// Strip a surrounding markdown code fence, if any.
fn unfence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = body.strip_suffix("```") else {
        return trimmed;
    };
    // Drop an info string such as `json` on the opening fence line.
    match body.split_once('\n') {
        Some((info, rest)) if !info.contains('{') => rest.trim(),
        _ => body.trim(),
    }
}

/// Split a Stage A reply into answer and self-evaluation.
///
/// Never fails: an unparseable evaluation yields `evaluation: None`, logs a
/// warning, and keeps the whole reply as the answer.
pub fn parse_reply(raw: &str) -> ParsedReply {
    // Preferred form: the last line carrying the marker.
    let lines: Vec<&str> = raw.lines().collect();
    let marker_line = lines.iter().enumerate().rev().find_map(|(idx, line)| {
        let trimmed = line.trim_start();
        let head = trimmed.get(..SELF_EVAL_MARKER.len())?;
        head.eq_ignore_ascii_case(SELF_EVAL_MARKER)
            .then(|| (idx, trimmed[SELF_EVAL_MARKER.len()..].to_string()))
    });

    if let Some((idx, payload)) = marker_line {
        let answer = lines
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, line)| *line)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
        let evaluation = evaluation(unfence(&payload)).map(|(e, _)| e);
        if evaluation.is_none() {
            warn!(payload = %payload.trim(), "unparseable self-evaluation line; not escalating");
        }
        return ParsedReply { answer, evaluation };
    }

    // Whole-reply JSON object with an `answer` key.
    if let Some((evaluation, Some(answer))) = evaluation(unfence(raw)) {
        return ParsedReply {
            answer: answer.trim().to_string(),
            evaluation: Some(evaluation),
        };
    }

    warn!(
        reply_chars = raw.chars().count(),
        "reply carried no self-evaluation; not escalating"
    );
    ParsedReply {
        answer: raw.trim().to_string(),
        evaluation: None,
    }
}

/// System instruction for a Stage B call: compact router context and a
/// request for a direct answer.
pub fn router_context(
    breakdown: &ScoreBreakdown,
    features: &RequestFeatures,
    stage_a: Option<&SelfEvaluation>,
) -> String {
    let flags = features.active_flags();
    let flags = if flags.is_empty() {
        "none".to_string()
    } else {
        flags.join(", ")
    };
    let (confidence, reasons) = match stage_a {
        Some(eval) => {
            let reasons: Vec<&str> = eval
                .reasons
                .iter()
                .take(MAX_FORWARDED_REASONS)
                .map(String::as_str)
                .collect();
            (
                format!("{:.2}", eval.confidence),
                if reasons.is_empty() {
                    "none".to_string()
                } else {
                    reasons.join("; ")
                },
            )
        }
        None => ("unknown".to_string(), "none".to_string()),
    };

    format!(
        "[Router context, for your information only]\n\
         A lighter model answered this request first and recommended escalation.\n\
         Request: score={score}, features={flags}\n\
         First attempt: confidence={confidence}, reasons={reasons}\n\n\
         Answer the request directly and follow any format it asks for. \
         Do not add a self-evaluation line or mention this context.",
        score = breakdown.score,
    )
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;

    #[test]
    fn parses_trailing_marker_line() {
        let reply = "Paris is the capital of France.\nSELF_EVAL: {\"confidence\": 0.95, \"should_escalate\": false, \"reasons\": []}";
        let parsed = parse_reply(reply);
        assert_eq!(parsed.answer, "Paris is the capital of France.");
        let eval = parsed.evaluation.unwrap();
        assert_eq!(eval.confidence, 0.95);
        assert!(!eval.escalate);
        assert!(!eval.should_escalate(0.75));
    }

    #[test]
    fn marker_is_case_insensitive_and_reasons_kept() {
        let reply = "Maybe 42.\n  self_eval: {\"confidence\": \"0.4\", \"should_escalate\": true, \"reasons\": [\"guessing\", \"ambiguous\"]}\n";
        let eval = parse_reply(reply).evaluation.unwrap();
        assert_eq!(eval.confidence, 0.4);
        assert!(eval.escalate);
        assert_eq!(eval.reasons, vec!["guessing", "ambiguous"]);
    }

    #[test]
    fn last_marker_line_wins_and_surrounding_lines_are_kept() {
        let reply = "SELF_EVAL: {\"confidence\": 0.1}\nLine one.\nSELF_EVAL: {\"confidence\": 0.8}\nLine two.";
        let parsed = parse_reply(reply);
        assert_eq!(
            parsed.answer,
            "SELF_EVAL: {\"confidence\": 0.1}\nLine one.\nLine two."
        );
        assert_eq!(parsed.evaluation.unwrap().confidence, 0.8);
    }

    #[test]
    fn confidence_is_clamped() {
        let eval = parse_reply("x\nSELF_EVAL: {\"confidence\": 7}")
            .evaluation
            .unwrap();
        assert_eq!(eval.confidence, 1.0);
        let eval = parse_reply("x\nSELF_EVAL: {\"confidence\": -3}")
            .evaluation
            .unwrap();
        assert_eq!(eval.confidence, 0.0);
    }

    #[test]
    fn whole_reply_json_object_is_accepted() {
        let reply = "```json\n{\"answer\": \"4\", \"confidence\": 0.99, \"should_escalate\": false, \"reasons\": []}\n```";
        let parsed = parse_reply(reply);
        assert_eq!(parsed.answer, "4");
        assert_eq!(parsed.evaluation.unwrap().confidence, 0.99);
    }

    #[test]
    #[tracing_test::traced_test]
    fn garbage_marker_payload_means_no_escalation() {
        let parsed = parse_reply("The answer.\nSELF_EVAL: {confidence: high}");
        assert_eq!(parsed.answer, "The answer.");
        assert!(parsed.evaluation.is_none());
        assert!(logs_contain("unparseable self-evaluation line"));
    }

    #[test]
    #[tracing_test::traced_test]
    fn missing_evaluation_keeps_full_reply() {
        let parsed = parse_reply("  just an answer  ");
        assert_eq!(parsed.answer, "just an answer");
        assert!(parsed.evaluation.is_none());
        assert!(logs_contain("no self-evaluation"));
    }

    #[test]
    fn threshold_boundary() {
        let at = SelfEvaluation {
            confidence: 0.75,
            escalate: false,
            reasons: vec![],
        };
        let below = SelfEvaluation {
            confidence: 0.74,
            ..at.clone()
        };
        assert!(!at.should_escalate(0.75));
        assert!(below.should_escalate(0.75));
    }

    #[test]
    fn router_context_limits_reasons() {
        let breakdown = ScoreBreakdown {
            score: 42,
            bonuses: BTreeMap::new(),
            hard_triggered: false,
            trigger_reasons: BTreeSet::new(),
        };
        let features = RequestFeatures {
            contains_code: true,
            ..Default::default()
        };
        let eval = SelfEvaluation {
            confidence: 0.3,
            escalate: true,
            reasons: ["a", "b", "c", "d"].map(String::from).to_vec(),
        };
        let context = router_context(&breakdown, &features, Some(&eval));
        assert!(context.contains("score=42"));
        assert!(context.contains("features=contains_code"));
        assert!(context.contains("confidence=0.30"));
        assert!(context.contains("reasons=a; b; c\n"));
        assert!(!context.contains(SELF_EVAL_MARKER));
    }
}
