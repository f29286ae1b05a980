// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::builtin::fsutil::list_dir_under;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Lists files under a drive directory (relative path).
pub struct DriveListTool {
    pub drive_root: PathBuf,
}

#[async_trait]
impl Tool for DriveListTool {
    fn name(&self) -> &str {
        "drive_list"
    }

    fn description(&self) -> &str {
        "List files under a drive directory (relative path), recursively."
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
        let listing = list_dir_under(&self.drive_root, dir, max_entries).await;
        if listing.get("error").is_some() {
            return ToolOutput::err(&call.id, listing.to_string());
        }
        ToolOutput::ok(&call.id, serde_json::to_string_pretty(&listing).unwrap_or_default())
    }
}
