// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// A single tool invocation, already parsed from the model's raw JSON
/// argument string by the registry.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim).
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// The result of executing one tool call.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: content.into(), is_error: false }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: msg.into(), is_error: true }
    }
}

/// Trait every built-in tool implements. The registry (not individual
/// tools) owns argument-parse failure, unknown-name, and truncation
/// handling per the tool execution contract (§4.2) — tools only ever see
/// already-parsed `args`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    /// Per-tool deadline in seconds; the Task Loop wraps each call in this.
    fn timeout_sec(&self) -> u64 {
        30
    }

    /// Read-only tools eligible for concurrent fan-out (§4.2's whitelist).
    /// Disjoint from `is_code_mutating` by construction.
    fn is_parallel_safe(&self) -> bool {
        false
    }

    /// Tools that write the repository must acquire the Git Coordinator's
    /// mutex; the Task Loop also uses this flag to force a profile switch
    /// to `code_task` after any mutating call completes.
    fn is_code_mutating(&self) -> bool {
        false
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}
