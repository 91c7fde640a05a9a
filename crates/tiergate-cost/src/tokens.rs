// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Input token estimation ahead of a provider call.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Per-message framing tokens added by chat-style APIs.
const MESSAGE_OVERHEAD_TOKENS: u32 = 8;

fn encoder() -> Option<&'static CoreBPE> {
    static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();
    ENCODER
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!(error = %e, "tokenizer unavailable, falling back to character estimate");
                None
            }
        })
        .as_ref()
}

/// Estimate the input tokens of a call from its system instruction and text.
///
/// Uses the cl100k BPE when available and never returns less than one token
/// per four characters, so the budget estimate errs on the high side.
pub fn estimate_input_tokens(system_prompt: Option<&str>, text: &str) -> u32 {
    let parts = system_prompt.into_iter().chain(std::iter::once(text));
    let mut total: u32 = 0;
    for part in parts {
        let by_chars = part.chars().count().div_ceil(4);
        let by_bpe = encoder().map_or(0, |bpe| bpe.encode_with_special_tokens(part).len());
        let count = u32::try_from(by_chars.max(by_bpe)).unwrap_or(u32::MAX);
        total = total
            .saturating_add(count)
            .saturating_add(MESSAGE_OVERHEAD_TOKENS);
    }
    total
}

/// Estimate the output tokens of generated text, for streams that ended
/// without a usage report.
pub fn estimate_output_tokens(text: &str) -> u32 {
    let by_chars = text.chars().count().div_ceil(4);
    let by_bpe = encoder().map_or(0, |bpe| bpe.encode_ordinary(text).len());
    u32::try_from(by_chars.max(by_bpe)).unwrap_or(u32::MAX)
}
