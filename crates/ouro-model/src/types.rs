// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

use ouro_config::ReasoningEffort;

/// A single content part in a multi-part message.
///
/// Images are always represented as data URLs (`data:<mime>;base64,<b64>`)
/// or HTTPS URLs for providers that accept remote references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { image_url: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
    pub fn image(image_url: impl Into<String>) -> Self {
        Self::Image { image_url: image_url.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A pending tool invocation emitted by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON-encoded argument object, as emitted by the model — parsing
    /// and validation against the tool's schema happens in `ouro-tools`.
    pub arguments_json: String,
}

/// A tool schema as handed to the LLM. `cache_hint` marks the last tool in
/// the list eligible for prompt-cache annotation (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub json_schema: serde_json::Value,
}

/// One entry in the [`ConversationBuffer`](ouro_core equivalent) sent to a
/// provider. `ouro-core` owns buffer-level invariants; this type is the wire
/// shape the LLM Client consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set only on `Role::Tool` messages: which call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentPart::text(text)],
            tool_calls: vec![],
            tool_call_id: None,
        }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::text(text)],
            tool_calls: vec![],
            tool_call_id: None,
        }
    }
    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: vec![ContentPart::text(text)],
            tool_calls: vec![],
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Per-call usage accounting, matching spec.md §4.3's usage record shape.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

impl Usage {
    /// Accumulates usage across rounds; matches the original `add_usage`
    /// helper's semantics.
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.cached_tokens += other.cached_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
        self.total_tokens += other.total_tokens;
        self.cost_usd += other.cost_usd;
    }

    pub fn cache_hit_pct(&self) -> f64 {
        if self.prompt_tokens == 0 {
            return 0.0;
        }
        (self.cached_tokens as f64 / self.prompt_tokens as f64) * 100.0
    }
}

/// A single chat request. `model_id` carries the routable `provider/model`
/// (or bare model) string; resolution happens in [`crate::resolve`].
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model_id: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub effort: ReasoningEffort,
    pub max_tokens: u32,
    /// Whether the last tool schema should receive a prompt-cache hint.
    pub cache_tools: bool,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    /// Provider-assigned id for the generation, used for an optional
    /// follow-up cost lookup (§4.3).
    pub generation_id: Option<String>,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// An inline image attached to a task, per spec.md §3's `optional image`.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub caption: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_add_accumulates_all_fields() {
        let mut total = Usage::default();
        total.add(&Usage {
            prompt_tokens: 100,
            completion_tokens: 20,
            cached_tokens: 10,
            cache_write_tokens: 5,
            total_tokens: 120,
            cost_usd: 0.01,
        });
        total.add(&Usage {
            prompt_tokens: 50,
            completion_tokens: 10,
            cached_tokens: 40,
            cache_write_tokens: 0,
            total_tokens: 60,
            cost_usd: 0.005,
        });
        assert_eq!(total.prompt_tokens, 150);
        assert_eq!(total.completion_tokens, 30);
        assert_eq!(total.cached_tokens, 50);
        assert_eq!(total.total_tokens, 180);
        assert!((total.cost_usd - 0.015).abs() < 1e-9);
    }

    #[test]
    fn cache_hit_pct_handles_zero_prompt_tokens() {
        let u = Usage::default();
        assert_eq!(u.cache_hit_pct(), 0.0);
    }

    #[test]
    fn cache_hit_pct_computes_ratio() {
        let u = Usage {
            prompt_tokens: 100,
            cached_tokens: 25,
            ..Default::default()
        };
        assert_eq!(u.cache_hit_pct(), 25.0);
    }

    #[test]
    fn message_text_concatenates_text_parts_only() {
        let m = Message {
            role: Role::User,
            content: vec![ContentPart::text("a"), ContentPart::image("http://x"), ContentPart::text("b")],
            tool_calls: vec![],
            tool_call_id: None,
        };
        assert_eq!(m.text(), "ab");
    }
}
