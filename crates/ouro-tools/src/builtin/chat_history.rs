// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

const DEFAULT_LIMIT: usize = 20;

/// Reads the tail of the owner chat's JSONL transcript, so a task can see
/// recent conversation context without it being replayed into every
/// system prompt.
pub struct ChatHistoryTool {
    pub chat_log_path: PathBuf,
}

#[async_trait]
impl Tool for ChatHistoryTool {
    fn name(&self) -> &str {
        "chat_history"
    }

    fn description(&self) -> &str {
        "Return the most recent chat messages exchanged with the owner."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "limit": { "type": "integer" } },
            "additionalProperties": false
        })
    }

    fn is_parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let limit = call.args.get("limit").and_then(Value::as_u64).unwrap_or(DEFAULT_LIMIT as u64) as usize;

        let text = match tokio::fs::read_to_string(&self.chat_log_path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ToolOutput::ok(&call.id, "[]"),
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let lines: Vec<Value> = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        let tail: Vec<&Value> = lines.iter().rev().take(limit).rev().collect();
        ToolOutput::ok(&call.id, serde_json::to_string_pretty(&tail).unwrap_or_default())
    }
}
