// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

const DEFAULT_MODEL: &str = "gpt-5";

/// Runs a hosted web search via the OpenAI Responses API and returns the
/// answer plus the sources the provider cited.
pub struct WebSearchTool {
    pub http: reqwest::Client,
    pub api_key: Option<String>,
    pub model: String,
}

impl WebSearchTool {
    pub fn new(api_key: Option<String>) -> Self {
        Self { http: reqwest::Client::new(), api_key, model: DEFAULT_MODEL.to_string() }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return an answer with cited sources."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "allowed_domains": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    fn is_parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let query = match call.args.get("query").and_then(Value::as_str) {
            Some(q) => q,
            None => return ToolOutput::err(&call.id, "missing 'query'"),
        };
        let api_key = match &self.api_key {
            Some(k) if !k.is_empty() => k,
            _ => {
                return ToolOutput::ok(
                    &call.id,
                    json!({ "error": "OPENAI_API_KEY is not set; web_search unavailable." }).to_string(),
                )
            }
        };
        let allowed_domains = call.args.get("allowed_domains").and_then(Value::as_array);

        let mut tool = json!({ "type": "web_search" });
        if let Some(domains) = allowed_domains {
            tool["filters"] = json!({ "allowed_domains": domains });
        }

        let body = json!({
            "model": self.model,
            "tools": [tool],
            "tool_choice": "auto",
            "include": ["web_search_call.action.sources"],
            "input": query,
        });

        let resp = match self
            .http
            .post("https://api.openai.com/v1/responses")
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.id, format!("web_search request error: {e}")),
        };

        let parsed: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => return ToolOutput::err(&call.id, format!("web_search response error: {e}")),
        };

        let sources = parsed["output"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .find(|i| i["type"] == "web_search_call")
                    .and_then(|i| i["action"]["sources"].as_array())
                    .cloned()
                    .unwrap_or_default()
            })
            .unwrap_or_default();

        let out = json!({
            "answer": parsed["output_text"].as_str().unwrap_or_default(),
            "sources": sources,
        });
        ToolOutput::ok(&call.id, serde_json::to_string_pretty(&out).unwrap_or_default())
    }
}
