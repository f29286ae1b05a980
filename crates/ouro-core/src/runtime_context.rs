// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Runtime context injected into every task's system prompt (spec.md §4.5
//! step 2). Each git lookup is best-effort: a failure is recorded as a
//! warning string rather than aborting prompt assembly, matching the
//! individually-try/excepted lookups in the source this is ported from.

use std::path::{Path, PathBuf};

use tokio::process::Command;

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRef {
    pub id: String,
    pub task_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct AgentRuntimeContext {
    pub utc_now: String,
    pub repo_dir: PathBuf,
    pub drive_root: PathBuf,
    pub git_head: Option<String>,
    pub git_branch: Option<String>,
    pub task: Option<TaskRef>,
    pub context_loading_warnings: Vec<String>,
}

impl AgentRuntimeContext {
    /// Builds the context for one task, probing `git` for HEAD/branch under
    /// `repo_dir`. Never fails: a git lookup error becomes a warning.
    pub async fn capture(utc_now: String, repo_dir: PathBuf, drive_root: PathBuf, task: Option<TaskRef>) -> Self {
        let mut warnings = Vec::new();
        let git_head = match run_git(&repo_dir, &["rev-parse", "--short", "HEAD"]).await {
            Ok(out) => Some(out),
            Err(e) => {
                warnings.push(format!("git HEAD lookup failed: {e}"));
                None
            }
        };
        let git_branch = match run_git(&repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"]).await {
            Ok(out) => Some(out),
            Err(e) => {
                warnings.push(format!("git branch lookup failed: {e}"));
                None
            }
        };
        Self { utc_now, repo_dir, drive_root, git_head, git_branch, task, context_loading_warnings: warnings }
    }

    /// Renders as the JSON object embedded in the runtime-context system
    /// message.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "utc_now": self.utc_now,
            "repo_dir": self.repo_dir.display().to_string(),
            "drive_root": self.drive_root.display().to_string(),
            "git_head": self.git_head,
            "git_branch": self.git_branch,
        });
        if let Some(task) = &self.task {
            obj["task"] = serde_json::json!({ "id": task.id, "type": task.task_type });
        }
        if !self.context_loading_warnings.is_empty() {
            obj["context_loading_warnings"] = serde_json::json!(self.context_loading_warnings);
        }
        obj
    }
}

async fn run_git(repo_dir: &Path, args: &[&str]) -> Result<String, String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_dir)
        .args(args)
        .output()
        .await
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_json_includes_task_only_when_present() {
        let ctx = AgentRuntimeContext {
            utc_now: "2026-08-01T00:00:00Z".into(),
            repo_dir: "/repo".into(),
            drive_root: "/drive".into(),
            git_head: Some("abc123".into()),
            git_branch: Some("main".into()),
            task: None,
            context_loading_warnings: vec![],
        };
        let json = ctx.to_json();
        assert!(json.get("task").is_none());
        assert_eq!(json["git_head"], "abc123");
    }

    #[test]
    fn to_json_includes_warnings_only_when_nonempty() {
        let ctx = AgentRuntimeContext {
            utc_now: "now".into(),
            repo_dir: "/repo".into(),
            drive_root: "/drive".into(),
            git_head: None,
            git_branch: None,
            task: Some(TaskRef { id: "t1".into(), task_type: "chat".into() }),
            context_loading_warnings: vec!["git HEAD lookup failed: not a repo".into()],
        };
        let json = ctx.to_json();
        assert_eq!(json["task"]["id"], "t1");
        assert_eq!(json["context_loading_warnings"][0], "git HEAD lookup failed: not a repo");
    }

    #[tokio::test]
    async fn capture_records_warning_when_repo_dir_is_not_a_git_repo() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AgentRuntimeContext::capture("now".into(), dir.path().to_path_buf(), "/drive".into(), None).await;
        assert!(ctx.git_head.is_none());
        assert!(!ctx.context_loading_warnings.is_empty());
    }
}
