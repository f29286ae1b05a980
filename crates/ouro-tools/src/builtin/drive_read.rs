// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::builtin::fsutil::read_text_under;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Reads a UTF-8 text file from the persistent drive root (durable
/// memory/notes storage, separate from the code repository).
pub struct DriveReadTool {
    pub drive_root: PathBuf,
}

#[async_trait]
impl Tool for DriveReadTool {
    fn name(&self) -> &str {
        "drive_read"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file from the drive root (relative path)."
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
        match read_text_under(&self.drive_root, path).await {
            Ok(text) => ToolOutput::ok(&call.id, text),
            Err(e) => ToolOutput::err(&call.id, e),
        }
    }
}
