// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use ouro_git::GitCoordinator;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Writes a file and commits it in one step: checkout dev, write, add,
/// commit, push. The canonical self-modification tool.
pub struct RepoWriteCommitTool {
    pub git: Arc<GitCoordinator>,
}

#[async_trait]
impl Tool for RepoWriteCommitTool {
    fn name(&self) -> &str {
        "repo_write_commit"
    }

    fn description(&self) -> &str {
        "Write a file in the repository and commit+push it to the dev branch in one step."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" },
                "commit_message": { "type": "string" }
            },
            "required": ["path", "content", "commit_message"],
            "additionalProperties": false
        })
    }

    fn is_code_mutating(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(Value::as_str) {
            Some(p) => p,
            None => return ToolOutput::err(&call.id, "missing 'path'"),
        };
        let content = match call.args.get("content").and_then(Value::as_str) {
            Some(c) => c,
            None => return ToolOutput::err(&call.id, "missing 'content'"),
        };
        let commit_message = match call.args.get("commit_message").and_then(Value::as_str) {
            Some(m) => m,
            None => return ToolOutput::err(&call.id, "missing 'commit_message'"),
        };

        match self.git.write_and_commit(path, content, commit_message).await {
            Ok(msg) => ToolOutput::ok(&call.id, msg),
            Err(e) => ToolOutput::err(&call.id, format!("GIT_ERROR: {e}")),
        }
    }
}
