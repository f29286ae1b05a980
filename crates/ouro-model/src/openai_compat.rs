// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared implementation for the OpenAI-compatible `/chat/completions` wire
//! format, used for the `openai`, `zai`, `opencode`, `openai-codex`, and
//! `google` providers (Google's Gemini API exposes an OpenAI-compatible
//! endpoint at `/v1beta/openai/`). Anthropic's Messages API is genuinely
//! different and gets its own adapter (`anthropic.rs`) — this is exactly the
//! "per-provider deviations isolated in provider-specific adapters" split
//! spec.md §4.3 calls for.

use serde_json::{json, Value};
use tracing::debug;

use crate::error::ModelError;
use crate::pricing::compute_cost;
use crate::types::{ChatRequest, ChatResponse, ContentPart, Role, ToolCall, Usage};
use ouro_config::ReasoningEffort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    Bearer,
    ApiKeyHeader,
}

#[derive(Debug)]
pub struct OpenAiCompatProvider {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub auth_style: AuthStyle,
    /// True for providers (currently none of the above by default) that
    /// pin upstream routing order and disable fallbacks on Anthropic models
    /// proxied through them.
    pub pin_anthropic_upstream: bool,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>, auth_style: AuthStyle) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key,
            auth_style,
            pin_anthropic_upstream: false,
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
        let messages: Vec<Value> = req.messages.iter().map(message_to_json).collect();

        let mut tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.json_schema,
                    }
                })
            })
            .collect();

        // Annotate the last tool schema as prompt-cache eligible (§4.3):
        // amortizes the tool-schema payload across rounds for providers
        // that honour `cache_control`.
        if req.cache_tools {
            if let Some(last) = tools.last_mut() {
                last["cache_control"] = json!({ "type": "ephemeral", "ttl": "1h" });
            }
        }

        let mut body = json!({
            "model": model_id,
            "messages": messages,
            "max_tokens": req.max_tokens,
            "tool_choice": "auto",
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools);
        }
        body["reasoning"] = json!({ "effort": Self::effort_str(req.effort), "exclude": true });

        if self.pin_anthropic_upstream && model_id.to_ascii_lowercase().contains("claude") {
            body["provider"] = json!({
                "order": ["Anthropic"],
                "allow_fallbacks": false,
                "require_parameters": true,
            });
        }

        body
    }

    pub async fn chat(&self, model_id: &str, req: &ChatRequest) -> Result<ChatResponse, ModelError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ModelError::ProviderNotConfigured(self.name.clone()))?;

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = self.build_body(model_id, req);

        debug!(provider = %self.name, model = model_id, "sending chat completion request");

        let mut builder = self.client.post(&url).json(&body);
        builder = match self.auth_style {
            AuthStyle::Bearer => builder.bearer_auth(api_key),
            AuthStyle::ApiKeyHeader => builder.header("api-key", api_key),
        };

        let resp = builder.send().await.map_err(|source| ModelError::Network {
            provider: self.name.clone(),
            source,
        })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|source| ModelError::Network {
            provider: self.name.clone(),
            source,
        })?;

        if !status.is_success() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ModelError::AuthOrQuota {
                    provider: self.name.clone(),
                    detail: text,
                });
            }
            return Err(ModelError::HttpStatus {
                provider: self.name.clone(),
                status: status.as_u16(),
                body: text,
            });
        }

        parse_response(&self.name, model_id, &text)
    }
}

fn message_to_json(m: &crate::types::Message) -> Value {
    let role = match m.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    let mut obj = json!({ "role": role });

    if m.content.len() == 1 {
        if let ContentPart::Text { text } = &m.content[0] {
            obj["content"] = json!(text);
        }
    }
    if !obj.as_object().unwrap().contains_key("content") {
        let parts: Vec<Value> = m
            .content
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                ContentPart::Image { image_url } => {
                    json!({ "type": "image_url", "image_url": { "url": image_url } })
                }
            })
            .collect();
        obj["content"] = Value::Array(parts);
    }

    if let Some(id) = &m.tool_call_id {
        obj["tool_call_id"] = json!(id);
    }
    if !m.tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(
            m.tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": { "name": tc.name, "arguments": tc.arguments_json },
                    })
                })
                .collect(),
        );
    }
    obj
}

fn parse_response(provider: &str, model_id: &str, text: &str) -> Result<ChatResponse, ModelError> {
    let v: Value = serde_json::from_str(text).map_err(|e| ModelError::MalformedResponse {
        provider: provider.to_string(),
        detail: e.to_string(),
    })?;

    let choice = v
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| ModelError::MalformedResponse {
            provider: provider.to_string(),
            detail: "missing choices[0]".into(),
        })?;
    let message = choice.get("message").cloned().unwrap_or(Value::Null);

    let content = message.get("content").and_then(|c| c.as_str()).unwrap_or("").to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(|t| t.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| {
                    let id = tc.get("id")?.as_str()?.to_string();
                    let func = tc.get("function")?;
                    let name = func.get("name")?.as_str()?.to_string();
                    let arguments_json = func.get("arguments")?.as_str().unwrap_or("{}").to_string();
                    Some(ToolCall { id, name, arguments_json })
                })
                .collect()
        })
        .unwrap_or_default();

    let usage_v = v.get("usage").cloned().unwrap_or(Value::Null);
    let prompt_tokens = usage_v.get("prompt_tokens").and_then(|x| x.as_u64()).unwrap_or(0);
    let completion_tokens = usage_v.get("completion_tokens").and_then(|x| x.as_u64()).unwrap_or(0);
    let total_tokens = usage_v.get("total_tokens").and_then(|x| x.as_u64()).unwrap_or(prompt_tokens + completion_tokens);

    // Cached/cache-write tokens read from a nested detail block when the top
    // level is absent, matching llm.py's `prompt_tokens_details` fallback.
    let details = usage_v.get("prompt_tokens_details");
    let cached_tokens = usage_v
        .get("cached_tokens")
        .or_else(|| details.and_then(|d| d.get("cached_tokens")))
        .and_then(|x| x.as_u64())
        .unwrap_or(0);
    let cache_write_tokens = usage_v
        .get("cache_write_tokens")
        .or_else(|| details.and_then(|d| d.get("cache_write_tokens")))
        .and_then(|x| x.as_u64())
        .unwrap_or(0);

    let cost_usd = usage_v
        .get("cost")
        .and_then(|x| x.as_f64())
        .unwrap_or_else(|| compute_cost(model_id, prompt_tokens, completion_tokens));

    let generation_id = v.get("id").and_then(|x| x.as_str()).map(|s| s.to_string());

    Ok(ChatResponse {
        content,
        tool_calls,
        usage: Usage {
            prompt_tokens,
            completion_tokens,
            cached_tokens,
            cache_write_tokens,
            total_tokens,
            cost_usd,
        },
        generation_id,
    })
}
