// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ouro_git::GitCoordinator;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::tool::{Tool, ToolCall, ToolOutput};

const OUTPUT_LIMIT_BYTES: usize = 20_000;
const HEAD_LINES: usize = 100;
const TAIL_LINES: usize = 100;
const DEFAULT_TIMEOUT_SEC: u64 = 60;

/// Runs a shell command in the repository working directory. Can mutate
/// the repository arbitrarily, so it shares the git mutex with the
/// explicit git tools rather than running unserialized.
pub struct RunShellTool {
    pub repo_dir: std::path::PathBuf,
    pub git: Arc<GitCoordinator>,
}

#[async_trait]
impl Tool for RunShellTool {
    fn name(&self) -> &str {
        "run_shell"
    }

    fn description(&self) -> &str {
        "Run a shell command in the repository working directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string" },
                "timeout_sec": { "type": "integer" }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn timeout_sec(&self) -> u64 {
        DEFAULT_TIMEOUT_SEC
    }

    fn is_code_mutating(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match call.args.get("command").and_then(Value::as_str) {
            Some(c) => c,
            None => return ToolOutput::err(&call.id, "missing 'command'"),
        };
        let timeout = Duration::from_secs(
            call.args.get("timeout_sec").and_then(Value::as_u64).unwrap_or(DEFAULT_TIMEOUT_SEC),
        );

        let repo_dir = self.repo_dir.clone();
        let command = command.to_string();
        let result = self
            .git
            .with_lock(|| async move { run_with_timeout(&repo_dir, &command, timeout).await })
            .await;

        match result {
            Ok(output) => ToolOutput::ok(&call.id, truncate_output(&output)),
            Err(e) => ToolOutput::err(&call.id, e),
        }
    }
}

async fn run_with_timeout(repo_dir: &std::path::Path, command: &str, timeout: Duration) -> Result<String, String> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(repo_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("spawn error: {e}"))?;

    let wait = async {
        let output = child.wait_with_output().await.map_err(|e| format!("wait error: {e}"))?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if output.status.success() {
            Ok(combined)
        } else {
            Err(format!("exit status {}: {combined}", output.status))
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(format!("TOOL_TIMEOUT: command exceeded {}s", timeout.as_secs())),
    }
}

fn truncate_output(output: &str) -> String {
    if output.len() <= OUTPUT_LIMIT_BYTES {
        return output.to_string();
    }
    let lines: Vec<&str> = output.lines().collect();
    if lines.len() <= HEAD_LINES + TAIL_LINES {
        return format!("{}... (truncated from {} chars)", &output[..OUTPUT_LIMIT_BYTES], output.len());
    }
    let head = lines[..HEAD_LINES].join("\n");
    let tail = lines[lines.len() - TAIL_LINES..].join("\n");
    format!(
        "{head}\n... ({} lines omitted, truncated from {} chars) ...\n{tail}",
        lines.len() - HEAD_LINES - TAIL_LINES,
        output.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_simple_command() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RunShellTool {
            repo_dir: dir.path().to_path_buf(),
            git: Arc::new(GitCoordinator::new(dir.path(), "main", "main")),
        };
        let call = ToolCall { id: "1".into(), name: "run_shell".into(), args: json!({ "command": "echo hi" }) };
        let out = tool.execute(&call).await;
        assert!(!out.is_error);
        assert_eq!(out.content.trim(), "hi");
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RunShellTool {
            repo_dir: dir.path().to_path_buf(),
            git: Arc::new(GitCoordinator::new(dir.path(), "main", "main")),
        };
        let call = ToolCall { id: "1".into(), name: "run_shell".into(), args: json!({ "command": "exit 7" }) };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn timeout_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RunShellTool {
            repo_dir: dir.path().to_path_buf(),
            git: Arc::new(GitCoordinator::new(dir.path(), "main", "main")),
        };
        let call = ToolCall {
            id: "1".into(),
            name: "run_shell".into(),
            args: json!({ "command": "sleep 2", "timeout_sec": 0 }),
        };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("TOOL_TIMEOUT"));
    }

    #[test]
    fn truncate_output_adds_marker_for_long_single_line() {
        let long = "x".repeat(OUTPUT_LIMIT_BYTES + 50);
        let truncated = truncate_output(&long);
        assert!(truncated.contains("truncated from"));
    }

    #[test]
    fn is_code_mutating() {
        let tool = RunShellTool {
            repo_dir: "/tmp".into(),
            git: Arc::new(GitCoordinator::new("/tmp", "main", "main")),
        };
        assert!(tool.is_code_mutating());
    }
}
