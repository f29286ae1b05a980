// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

const MAX_WALK_ENTRIES: usize = 20_000;

/// Summarizes the repository's structure (file count, size, extension
/// breakdown) without dumping every path, so the model can orient itself
/// in one cheap call instead of many `repo_list` rounds.
pub struct CodebaseDigestTool {
    pub repo_dir: PathBuf,
}

#[async_trait]
impl Tool for CodebaseDigestTool {
    fn name(&self) -> &str {
        "codebase_digest"
    }

    fn description(&self) -> &str {
        "Summarize the repository: file count, total size, and a breakdown by file extension."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    fn is_parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match build_digest(&self.repo_dir).await {
            Ok(digest) => ToolOutput::ok(&call.id, serde_json::to_string_pretty(&digest).unwrap_or_default()),
            Err(e) => ToolOutput::err(&call.id, e),
        }
    }
}

async fn build_digest(root: &std::path::Path) -> Result<Value, String> {
    let mut file_count: u64 = 0;
    let mut total_bytes: u64 = 0;
    let mut by_extension: BTreeMap<String, u64> = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];
    let mut visited = 0usize;

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| format!("read_dir error: {e}"))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| format!("read_dir error: {e}"))? {
            if visited >= MAX_WALK_ENTRIES {
                break;
            }
            visited += 1;
            let path = entry.path();
            if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if meta.is_dir() {
                stack.push(path);
                continue;
            }
            file_count += 1;
            total_bytes += meta.len();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("(none)").to_string();
            *by_extension.entry(ext).or_insert(0) += 1;
        }
    }

    Ok(json!({
        "file_count": file_count,
        "total_bytes": total_bytes,
        "by_extension": by_extension,
        "truncated": visited >= MAX_WALK_ENTRIES,
    }))
}
