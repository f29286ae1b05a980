// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The Context Compactor (spec.md §4.4). Unlike a summarization pass, this is
//! a pure, deterministic rewrite of the message list: the last `KEEP_PAIRS`
//! assistant/tool-call round-trips survive untouched, and every earlier tool
//! result is collapsed to a one-line placeholder. No model call is made.

use ouro_model::{ContentPart, Message, Role};

/// Number of trailing assistant/tool-call pairs kept verbatim, per spec.md
/// §4.4 ("after every round beyond the first, keep the last 4 pairs").
pub const KEEP_PAIRS: usize = 4;

/// Hard cap applied to any single tool-result string regardless of which
/// round it belongs to (spec.md §4.2 invariant, reapplied here because a
/// provider can return a tool message larger than the registry's own cap
/// when replaying from a saved session).
const MAX_RESULT_CHARS: usize = 3000;

/// A `(start, tool_message_indices)` span: `start` is the index of the
/// tool-calling assistant message, and `tool_message_indices` are the
/// indices of the `tool` messages that answer it, in call order.
struct Pair {
    assistant_idx: usize,
    tool_indices: Vec<usize>,
}

fn find_pairs(messages: &[Message]) -> Vec<Pair> {
    let mut pairs = Vec::new();
    let mut i = 0;
    while i < messages.len() {
        let msg = &messages[i];
        if msg.role == Role::Assistant && !msg.tool_calls.is_empty() {
            let tool_indices: Vec<usize> = (i + 1..=i + msg.tool_calls.len()).filter(|&j| j < messages.len()).collect();
            let advance = 1 + tool_indices.len();
            pairs.push(Pair { assistant_idx: i, tool_indices });
            i += advance;
        } else {
            i += 1;
        }
    }
    pairs
}

/// Rewrites `messages` in place, collapsing every tool result that belongs
/// to a pair older than the last [`KEEP_PAIRS`]. Returns the number of tool
/// results that were collapsed.
///
/// The assistant/tool-calls pairing invariant (spec.md §3) is preserved
/// exactly: messages are never removed or reordered, only tool-result
/// content is replaced.
pub fn compact_history(messages: &mut [Message]) -> usize {
    let pairs = find_pairs(messages);
    if pairs.len() <= KEEP_PAIRS {
        return 0;
    }
    let stale = &pairs[..pairs.len() - KEEP_PAIRS];
    let mut collapsed = 0;
    for pair in stale {
        let tool_names = tool_names_for(messages, pair.assistant_idx);
        for (offset, &idx) in pair.tool_indices.iter().enumerate() {
            let original_bytes = messages[idx].text().len();
            let tool_name = tool_names.get(offset).map(String::as_str).unwrap_or("tool");
            let placeholder = format!("[compacted: {tool_name} → {original_bytes} bytes]");
            if is_already_compacted(&messages[idx]) {
                continue;
            }
            messages[idx].content = vec![ContentPart::text(placeholder)];
            collapsed += 1;
        }
    }
    collapsed
}

fn tool_names_for(messages: &[Message], assistant_idx: usize) -> Vec<String> {
    messages[assistant_idx].tool_calls.iter().map(|c| c.name.clone()).collect()
}

fn is_already_compacted(msg: &Message) -> bool {
    msg.text().starts_with("[compacted: ")
}

/// Truncates a single tool-result string to [`MAX_RESULT_CHARS`], appending
/// an original-length marker. Idempotent: already-short strings pass
/// through unchanged.
pub fn truncate_tool_result(content: &str) -> String {
    let len = content.chars().count();
    if len <= MAX_RESULT_CHARS {
        return content.to_string();
    }
    let head: String = content.chars().take(MAX_RESULT_CHARS).collect();
    format!("{head}\n... (truncated from {len} chars)")
}
