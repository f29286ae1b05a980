// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use ouro_git::GitCoordinator;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Commits and pushes changes already present in the working tree
/// (e.g. from `run_shell`), without writing any file itself.
pub struct RepoCommitPushTool {
    pub git: Arc<GitCoordinator>,
}

#[async_trait]
impl Tool for RepoCommitPushTool {
    fn name(&self) -> &str {
        "repo_commit_push"
    }

    fn description(&self) -> &str {
        "Commit and push changes already present in the repository working tree."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "commit_message": { "type": "string" },
                "paths": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["commit_message"],
            "additionalProperties": false
        })
    }

    fn is_code_mutating(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let commit_message = match call.args.get("commit_message").and_then(Value::as_str) {
            Some(m) => m,
            None => return ToolOutput::err(&call.id, "missing 'commit_message'"),
        };
        let paths: Option<Vec<String>> = call
            .args
            .get("paths")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect());

        match self.git.commit_existing_changes(commit_message, paths.as_deref()).await {
            Ok(msg) => ToolOutput::ok(&call.id, msg),
            Err(e) => ToolOutput::err(&call.id, format!("GIT_ERROR: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command as StdCommand;

    use serde_json::json;

    use super::*;

    fn init_clone() -> (tempfile::TempDir, tempfile::TempDir) {
        let upstream = tempfile::tempdir().unwrap();
        let run = |dir: &std::path::Path, args: &[&str]| {
            StdCommand::new("git").args(args).current_dir(dir).output().unwrap();
        };
        run(upstream.path(), &["init", "-q"]);
        run(upstream.path(), &["config", "user.email", "t@example.com"]);
        run(upstream.path(), &["config", "user.name", "T"]);
        std::fs::write(upstream.path().join("README.md"), "hi\n").unwrap();
        run(upstream.path(), &["add", "-A"]);
        run(upstream.path(), &["commit", "-q", "-m", "init"]);
        run(upstream.path(), &["branch", "-m", "main"]);
        run(upstream.path(), &["config", "receive.denyCurrentBranch", "updateInstead"]);

        let work = tempfile::tempdir().unwrap();
        StdCommand::new("git")
            .args(["clone", "-q", upstream.path().to_str().unwrap(), "."])
            .current_dir(work.path())
            .output()
            .unwrap();
        run(work.path(), &["config", "user.email", "t@example.com"]);
        run(work.path(), &["config", "user.name", "T"]);
        (upstream, work)
    }

    #[tokio::test]
    async fn commits_preexisting_changes() {
        let (_upstream, work) = init_clone();
        std::fs::write(work.path().join("README.md"), "changed\n").unwrap();
        let tool = RepoCommitPushTool { git: Arc::new(GitCoordinator::new(work.path(), "main", "main")) };
        let call = ToolCall {
            id: "1".into(),
            name: "repo_commit_push".into(),
            args: json!({ "commit_message": "update readme" }),
        };
        let out = tool.execute(&call).await;
        assert!(!out.is_error, "{}", out.content);
    }

    #[tokio::test]
    async fn no_changes_is_a_tool_error() {
        let (_upstream, work) = init_clone();
        let tool = RepoCommitPushTool { git: Arc::new(GitCoordinator::new(work.path(), "main", "main")) };
        let call = ToolCall {
            id: "1".into(),
            name: "repo_commit_push".into(),
            args: json!({ "commit_message": "nothing" }),
        };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }
}
