// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Anthropic Messages API adapter. Genuinely not OpenAI-compatible (no
//! `choices`, system prompt is a top-level field, content is block-based) so
//! it gets its own adapter rather than routing through `openai_compat`.

use serde_json::{json, Value};
use tracing::debug;

use crate::error::ModelError;
use crate::pricing::compute_cost;
use crate::types::{ChatRequest, ChatResponse, ContentPart, Role, ToolCall, Usage};
use ouro_config::ReasoningEffort;

#[derive(Debug)]
pub struct AnthropicProvider {
    pub api_key: Option<String>,
    pub base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com/v1".to_string()),
            client: reqwest::Client::new(),
        }
    }

    fn effort_str(effort: ReasoningEffort) -> &'static str {
        match effort {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
            ReasoningEffort::Xhigh => "xhigh",
        }
    }

    fn build_body(&self, model_id: &str, req: &ChatRequest) -> Value {
        let mut system_text = String::new();
        let mut messages = Vec::new();

        for m in &req.messages {
            if m.role == Role::System {
                if !system_text.is_empty() {
                    system_text.push('\n');
                }
                system_text.push_str(&m.text());
                continue;
            }
            messages.push(message_to_block(m));
        }

        let mut tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.json_schema,
                })
            })
            .collect();
        if req.cache_tools {
            if let Some(last) = tools.last_mut() {
                last["cache_control"] = json!({ "type": "ephemeral" });
            }
        }

        let mut body = json!({
            "model": model_id,
            "max_tokens": req.max_tokens,
            "messages": messages,
            "reasoning_effort": Self::effort_str(req.effort),
        });
        if !system_text.is_empty() {
            body["system"] = json!([{ "type": "text", "text": system_text, "cache_control": { "type": "ephemeral" } }]);
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools);
        }
        body
    }

    pub async fn chat(&self, model_id: &str, req: &ChatRequest) -> Result<ChatResponse, ModelError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ModelError::ProviderNotConfigured("anthropic".to_string()))?;

        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));
        let body = self.build_body(model_id, req);

        debug!(model = model_id, "sending anthropic messages request");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|source| ModelError::Network { provider: "anthropic".to_string(), source })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|source| ModelError::Network { provider: "anthropic".to_string(), source })?;

        if !status.is_success() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ModelError::AuthOrQuota { provider: "anthropic".to_string(), detail: text });
            }
            return Err(ModelError::HttpStatus { provider: "anthropic".to_string(), status: status.as_u16(), body: text });
        }

        parse_response(model_id, &text)
    }
}

fn message_to_block(m: &crate::types::Message) -> Value {
    let role = match m.role {
        Role::Assistant => "assistant",
        Role::Tool => "user", // Anthropic carries tool results as user-turn tool_result blocks.
        _ => "user",
    };

    let mut content: Vec<Value> = Vec::new();

    if let Some(tool_call_id) = &m.tool_call_id {
        content.push(json!({
            "type": "tool_result",
            "tool_use_id": tool_call_id,
            "content": m.text(),
        }));
    } else {
        for p in &m.content {
            match p {
                ContentPart::Text { text } => content.push(json!({ "type": "text", "text": text })),
                ContentPart::Image { image_url } => content.push(json!({
                    "type": "image",
                    "source": { "type": "url", "url": image_url },
                })),
            }
        }
    }

    for tc in &m.tool_calls {
        let input: Value = serde_json::from_str(&tc.arguments_json).unwrap_or(json!({}));
        content.push(json!({ "type": "tool_use", "id": tc.id, "name": tc.name, "input": input }));
    }

    json!({ "role": role, "content": content })
}

fn parse_response(model_id: &str, text: &str) -> Result<ChatResponse, ModelError> {
    let v: Value = serde_json::from_str(text)
        .map_err(|e| ModelError::MalformedResponse { provider: "anthropic".to_string(), detail: e.to_string() })?;

    let blocks = v.get("content").and_then(|c| c.as_array()).ok_or_else(|| ModelError::MalformedResponse {
        provider: "anthropic".to_string(),
        detail: "missing content array".into(),
    })?;

    let mut text_out = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                    text_out.push_str(t);
                }
            }
            Some("tool_use") => {
                let id = block.get("id").and_then(|x| x.as_str()).unwrap_or_default().to_string();
                let name = block.get("name").and_then(|x| x.as_str()).unwrap_or_default().to_string();
                let arguments_json = block.get("input").cloned().unwrap_or(json!({})).to_string();
                tool_calls.push(ToolCall { id, name, arguments_json });
            }
            _ => {}
        }
    }

    let usage_v = v.get("usage").cloned().unwrap_or(Value::Null);
    let prompt_tokens = usage_v.get("input_tokens").and_then(|x| x.as_u64()).unwrap_or(0);
    let completion_tokens = usage_v.get("output_tokens").and_then(|x| x.as_u64()).unwrap_or(0);
    let cached_tokens = usage_v.get("cache_read_input_tokens").and_then(|x| x.as_u64()).unwrap_or(0);
    let cache_write_tokens = usage_v.get("cache_creation_input_tokens").and_then(|x| x.as_u64()).unwrap_or(0);

    Ok(ChatResponse {
        content: text_out,
        tool_calls,
        usage: Usage {
            prompt_tokens,
            completion_tokens,
            cached_tokens,
            cache_write_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cost_usd: compute_cost(model_id, prompt_tokens, completion_tokens),
        },
        generation_id: v.get("id").and_then(|x| x.as_str()).map(|s| s.to_string()),
    })
}
