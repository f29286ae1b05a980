// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared path-safety and directory-listing helpers used by the
//! repo/drive tools. A relative path is safe when it contains no `..`
//! component and is not absolute.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

pub fn safe_join(root: &Path, rel: &str) -> Result<PathBuf, String> {
    let rel = rel.trim_start_matches('/');
    let p = Path::new(rel);
    if p.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err("path traversal is not allowed".to_string());
    }
    Ok(root.join(p))
}

pub async fn read_text_under(root: &Path, rel: &str) -> Result<String, String> {
    let path = safe_join(root, rel)?;
    tokio::fs::read_to_string(&path).await.map_err(|e| format!("{e}"))
}

/// Mirrors the original `list_dir`'s recursive listing with a max-entries
/// cap and a `truncated` flag.
pub async fn list_dir_under(root: &Path, rel: &str, max_entries: usize) -> Value {
    let base = match safe_join(root, rel) {
        Ok(p) => p,
        Err(e) => return json!({ "error": e }),
    };
    if !base.exists() {
        return json!({
            "error": format!("path does not exist: {rel}"),
            "hint": "list '.' to see available paths",
        });
    }
    if !base.is_dir() {
        return json!({
            "error": format!("not a directory: {rel}"),
            "hint": "this is a file; use the read tool instead",
        });
    }

    let mut entries = Vec::new();
    let mut stack = vec![base.clone()];
    let mut paths = Vec::new();
    while let Some(dir) = stack.pop() {
        let mut rd = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(_) => continue,
        };
        while let Ok(Some(entry)) = rd.next_entry().await {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            paths.push(path);
        }
    }
    paths.sort();

    let truncated = paths.len() > max_entries;
    for path in paths.into_iter().take(max_entries) {
        let is_dir = path.is_dir();
        let size = if is_dir { None } else { std::fs::metadata(&path).ok().map(|m| m.len()) };
        let rel_to_root = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().to_string();
        entries.push(json!({ "path": rel_to_root, "is_dir": is_dir, "size": size }));
    }

    json!({
        "base": base.to_string_lossy(),
        "count": entries.len(),
        "items": entries,
        "truncated": truncated,
    })
}
