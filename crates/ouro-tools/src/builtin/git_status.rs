// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use ouro_git::GitCoordinator;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Reports `git status --porcelain` for the repository.
pub struct GitStatusTool {
    pub git: Arc<GitCoordinator>,
}

#[async_trait]
impl Tool for GitStatusTool {
    fn name(&self) -> &str {
        "git_status"
    }

    fn description(&self) -> &str {
        "Report the repository's working tree status."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.git.status().await {
            Ok(status) if status.is_empty() => ToolOutput::ok(&call.id, "clean"),
            Ok(status) => ToolOutput::ok(&call.id, status),
            Err(e) => ToolOutput::err(&call.id, format!("GIT_ERROR: {e}")),
        }
    }
}
