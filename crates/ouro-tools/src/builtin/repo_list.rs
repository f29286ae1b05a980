// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::builtin::fsutil::list_dir_under;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Lists files under a repository directory, relative to its root.
pub struct RepoListTool {
    pub repo_dir: PathBuf,
}

#[async_trait]
impl Tool for RepoListTool {
    fn name(&self) -> &str {
        "repo_list"
    }

    fn description(&self) -> &str {
        "List files under a repo directory (relative path), recursively."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dir": { "type": "string" },
                "max_entries": { "type": "integer" }
            },
            "required": ["dir"],
            "additionalProperties": false
        })
    }

    fn is_parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let dir = match call.args.get("dir").and_then(Value::as_str) {
            Some(d) => d,
            None => return ToolOutput::err(&call.id, "missing 'dir'"),
        };
        let max_entries = call.args.get("max_entries").and_then(Value::as_u64).unwrap_or(500) as usize;
        let listing = list_dir_under(&self.repo_dir, dir, max_entries).await;
        if listing.get("error").is_some() {
            return ToolOutput::err(&call.id, listing.to_string());
        }
        ToolOutput::ok(&call.id, serde_json::to_string_pretty(&listing).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn lists_repo_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "").unwrap();
        let tool = RepoListTool { repo_dir: dir.path().to_path_buf() };
        let call = ToolCall { id: "1".into(), name: "repo_list".into(), args: json!({ "dir": "." }) };
        let out = tool.execute(&call).await;
        assert!(!out.is_error);
        assert!(out.content.contains("a.rs"));
    }

    #[tokio::test]
    async fn missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RepoListTool { repo_dir: dir.path().to_path_buf() };
        let call = ToolCall { id: "1".into(), name: "repo_list".into(), args: json!({ "dir": "nope" }) };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }
}
