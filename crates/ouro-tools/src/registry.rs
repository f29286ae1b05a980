// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Central tool registry implementing the execution contract of spec.md
//! §4.2: argument-parse failure, unknown-tool, and hard truncation are all
//! handled here so individual tools never see malformed input or have to
//! remember the 3000-character cap.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::tool::{Tool, ToolCall};

/// Hard cap on a tool's returned string, per spec.md §4.2 and invariant 4
/// of the testable-properties list.
const MAX_RESULT_CHARS: usize = 3000;

#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn timeout_for(&self, name: &str) -> Option<u64> {
        self.tools.get(name).map(|t| t.timeout_sec())
    }

    pub fn is_parallel_safe(&self, name: &str) -> bool {
        self.tools.get(name).map(|t| t.is_parallel_safe()).unwrap_or(false)
    }

    pub fn is_code_mutating(&self, name: &str) -> bool {
        self.tools.get(name).map(|t| t.is_code_mutating()).unwrap_or(false)
    }

    /// Executes one call: parses `arguments_json`, dispatches, and
    /// truncates the result. Returns the string the Task Loop wraps into a
    /// `tool` message alongside whether the call failed, per spec.md §4.2 —
    /// never panics, never exceeds `MAX_RESULT_CHARS`.
    ///
    /// A handler failure (`output.is_error`) is wrapped in the
    /// `"⚠️ TOOL_ERROR (<name>): <msg>"` envelope so the marker, not a
    /// string-prefix heuristic on the handler's own wording, is what
    /// callers key error detection off of.
    pub async fn execute(&self, id: &str, name: &str, arguments_json: &str) -> (String, bool) {
        let args = match serde_json::from_str::<serde_json::Value>(arguments_json) {
            Ok(v) => v,
            Err(e) => {
                warn!(tool = name, error = %e, "tool call argument parse failure");
                return (format!("⚠️ TOOL_ARG_ERROR: {e}"), true);
            }
        };

        let tool = match self.tools.get(name) {
            Some(t) => t.clone(),
            None => {
                warn!(tool = name, "unknown tool requested");
                return (format!("⚠️ UNKNOWN_TOOL: {name}. Available: {}", self.names().join(", ")), true);
            }
        };

        debug!(tool = name, call_id = id, "executing tool call");
        let call = ToolCall { id: id.to_string(), name: name.to_string(), args };
        let output = tool.execute(&call).await;
        if output.is_error {
            warn!(tool = name, error = %output.content, "tool handler error");
            (truncate(&format!("⚠️ TOOL_ERROR ({name}): {}", output.content)), true)
        } else {
            (truncate(&output.content), false)
        }
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_RESULT_CHARS {
        return s.to_string();
    }
    let original_len = s.chars().count();
    let head: String = s.chars().take(MAX_RESULT_CHARS).collect();
    format!("{head}\n... (truncated from {original_len} chars)")
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::tool::ToolOutput;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn is_parallel_safe(&self) -> bool {
            true
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("echo:{}", call.args))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "always errors"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::err(&call.id, "missing 'path'")
        }
    }

    struct BigTool;

    #[async_trait]
    impl Tool for BigTool {
        fn name(&self) -> &str {
            "big"
        }
        fn description(&self) -> &str {
            "returns a huge string"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, "x".repeat(5000))
        }
    }

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        reg.register(BigTool);
        reg.register(FailingTool);
        reg
    }

    #[tokio::test]
    async fn executes_known_tool() {
        let (out, is_error) = registry().execute("1", "echo", r#"{"x":1}"#).await;
        assert!(out.starts_with("echo:"));
        assert!(!is_error);
    }

    #[tokio::test]
    async fn malformed_json_returns_tool_arg_error() {
        let (out, is_error) = registry().execute("1", "echo", "{not json").await;
        assert!(out.starts_with("⚠️ TOOL_ARG_ERROR:"));
        assert!(is_error);
    }

    #[tokio::test]
    async fn unknown_tool_lists_available_names() {
        let (out, is_error) = registry().execute("1", "nope", "{}").await;
        assert!(out.starts_with("⚠️ UNKNOWN_TOOL: nope. Available:"));
        assert!(out.contains("echo"));
        assert!(is_error);
    }

    #[tokio::test]
    async fn handler_error_is_wrapped_in_tool_error_envelope() {
        let (out, is_error) = registry().execute("1", "failing", "{}").await;
        assert_eq!(out, "⚠️ TOOL_ERROR (failing): missing 'path'");
        assert!(is_error);
    }

    #[tokio::test]
    async fn oversized_result_is_truncated_with_length_marker() {
        let (out, is_error) = registry().execute("1", "big", "{}").await;
        assert!(out.len() < 5000);
        assert!(out.contains("truncated from 5000 chars"));
        assert!(!is_error);
    }

    #[test]
    fn classification_queries_reflect_registered_tool() {
        let reg = registry();
        assert!(reg.is_parallel_safe("echo"));
        assert!(!reg.is_code_mutating("echo"));
        assert_eq!(reg.timeout_for("echo"), Some(30));
        assert_eq!(reg.timeout_for("missing"), None);
    }

    #[test]
    fn schemas_sorted_by_name() {
        let reg = registry();
        let names: Vec<_> = reg.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["big", "echo"]);
    }
}
