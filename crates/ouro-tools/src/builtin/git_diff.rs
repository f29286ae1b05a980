// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use ouro_git::GitCoordinator;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Reports the unstaged+staged diff for the repository.
pub struct GitDiffTool {
    pub git: Arc<GitCoordinator>,
}

#[async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show the repository's current diff against HEAD."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.git.diff().await {
            Ok(diff) if diff.is_empty() => ToolOutput::ok(&call.id, "no changes"),
            Ok(diff) => ToolOutput::ok(&call.id, diff),
            Err(e) => ToolOutput::err(&call.id, format!("GIT_ERROR: {e}")),
        }
    }
}
