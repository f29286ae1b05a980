// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::builtin::fsutil::read_text_under;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Reads a UTF-8 text file from the repository, relative to its root.
pub struct RepoReadTool {
    pub repo_dir: PathBuf,
}

#[async_trait]
impl Tool for RepoReadTool {
    fn name(&self) -> &str {
        "repo_read"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file from the repository (path relative to repo root)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn is_parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(Value::as_str) {
            Some(p) => p,
            None => return ToolOutput::err(&call.id, "missing 'path'"),
        };
        match read_text_under(&self.repo_dir, path).await {
            Ok(text) => ToolOutput::ok(&call.id, text),
            Err(e) => ToolOutput::err(&call.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(path: &str) -> ToolCall {
        ToolCall { id: "1".into(), name: "repo_read".into(), args: json!({ "path": path }) }
    }

    #[tokio::test]
    async fn reads_file_relative_to_repo_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "hello\n").unwrap();
        let tool = RepoReadTool { repo_dir: dir.path().to_path_buf() };
        let out = tool.execute(&call("README.md")).await;
        assert!(!out.is_error);
        assert_eq!(out.content, "hello\n");
    }

    #[tokio::test]
    async fn missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RepoReadTool { repo_dir: dir.path().to_path_buf() };
        let out = tool.execute(&call("nope.md")).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RepoReadTool { repo_dir: dir.path().to_path_buf() };
        let out = tool.execute(&call("../../etc/passwd")).await;
        assert!(out.is_error);
    }

    #[test]
    fn is_parallel_safe() {
        let tool = RepoReadTool { repo_dir: PathBuf::from("/tmp") };
        assert!(tool.is_parallel_safe());
        assert!(!tool.is_code_mutating());
    }
}
