// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use crate::builtin::fsutil::safe_join;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Writes (overwrite or append) a UTF-8 text file under the drive root.
/// Not in the read-only parallel-safe whitelist — serialized like every
/// other non-repo mutation — but not `is_code_mutating` either, since it
/// never touches the git-tracked repository.
pub struct DriveWriteTool {
    pub drive_root: PathBuf,
}

#[async_trait]
impl Tool for DriveWriteTool {
    fn name(&self) -> &str {
        "drive_write"
    }

    fn description(&self) -> &str {
        "Write a UTF-8 text file under the drive root (relative path). mode is 'overwrite' or 'append'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" },
                "mode": { "type": "string", "enum": ["overwrite", "append"] }
            },
            "required": ["path", "content", "mode"],
            "additionalProperties": false
        })
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
        let mode = call.args.get("mode").and_then(Value::as_str).unwrap_or("overwrite");

        let target = match safe_join(&self.drive_root, path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        if let Some(parent) = target.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutput::err(&call.id, format!("mkdir error: {e}"));
            }
        }

        let result = match mode {
            "overwrite" => tokio::fs::write(&target, content).await,
            "append" => async {
                let mut f = tokio::fs::OpenOptions::new().append(true).create(true).open(&target).await?;
                f.write_all(content.as_bytes()).await
            }
            .await,
            other => return ToolOutput::err(&call.id, format!("unknown mode: {other}")),
        };

        match result {
            Ok(()) => ToolOutput::ok(&call.id, format!("OK: wrote {mode} {path} ({} chars)", content.len())),
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overwrite_then_append_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let tool = DriveWriteTool { drive_root: dir.path().to_path_buf() };

        let w = tool
            .execute(&ToolCall {
                id: "1".into(),
                name: "drive_write".into(),
                args: json!({ "path": "note.txt", "content": "a", "mode": "overwrite" }),
            })
            .await;
        assert!(!w.is_error);

        let a = tool
            .execute(&ToolCall {
                id: "2".into(),
                name: "drive_write".into(),
                args: json!({ "path": "note.txt", "content": "b", "mode": "append" }),
            })
            .await;
        assert!(!a.is_error);

        let text = std::fs::read_to_string(dir.path().join("note.txt")).unwrap();
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = DriveWriteTool { drive_root: dir.path().to_path_buf() };
        let out = tool
            .execute(&ToolCall {
                id: "1".into(),
                name: "drive_write".into(),
                args: json!({ "path": "../escape.txt", "content": "x", "mode": "overwrite" }),
            })
            .await;
        assert!(out.is_error);
    }

    #[test]
    fn not_code_mutating_and_not_parallel_safe() {
        let tool = DriveWriteTool { drive_root: PathBuf::from("/tmp") };
        assert!(!tool.is_code_mutating());
        assert!(!tool.is_parallel_safe());
    }
}
