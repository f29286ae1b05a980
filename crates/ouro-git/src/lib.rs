// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Git Coordinator: a process-wide mutex serializing every git invocation,
//! plus the step-sequenced operations built on top of it
//! (write-and-commit, commit-existing-changes, promote-to-stable,
//! bootstrap-reset). Any failed step short-circuits with a [`GitError`]
//! naming the step that failed, mirroring the `⚠️ GIT_ERROR (<step>): <e>`
//! messages the tool layer returns to the model.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git {step} failed: {detail}")]
    Step { step: &'static str, detail: String },
    #[error("commit message must be non-empty")]
    EmptyCommitMessage,
    #[error("nothing to commit")]
    NoChanges,
    #[error("path escapes the repository root: {0:?}")]
    UnsafePath(String),
}

/// Bootstrap-reset policy for unpushed local work found at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescuePolicy {
    /// Discard unpushed commits silently.
    Ignore,
    /// Stash unpushed work under `refs/rescued/<timestamp>` before resetting.
    RescueAndReset,
}

pub struct GitCoordinator {
    repo_dir: PathBuf,
    branch_dev: String,
    branch_stable: String,
    mutex: Mutex<()>,
}

impl GitCoordinator {
    pub fn new(repo_dir: impl Into<PathBuf>, branch_dev: impl Into<String>, branch_stable: impl Into<String>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            branch_dev: branch_dev.into(),
            branch_stable: branch_stable.into(),
            mutex: Mutex::new(()),
        }
    }

    /// Runs `f` while holding the git mutex. Lets mutating tools outside
    /// this crate (e.g. `run_shell`) share the same serialization point
    /// without routing through a git subcommand themselves.
    pub async fn with_lock<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.mutex.lock().await;
        f().await
    }

    async fn run(&self, step: &'static str, args: &[&str]) -> Result<String, GitError> {
        debug!(step, args = ?args, "git coordinator running");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| GitError::Step { step, detail: e.to_string() })?;
        if !output.status.success() {
            let detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(GitError::Step { step, detail });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Rejects absolute paths and `..` components; returns the path
    /// resolved relative to `repo_dir`.
    pub fn safe_relpath(&self, path: &str) -> Result<PathBuf, GitError> {
        let p = Path::new(path);
        if p.is_absolute() || p.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(GitError::UnsafePath(path.to_string()));
        }
        Ok(self.repo_dir.join(p))
    }

    /// checkout dev → write file → add → commit → push. Canonical
    /// self-modification path.
    pub async fn write_and_commit(&self, path: &str, content: &str, commit_message: &str) -> Result<String, GitError> {
        if commit_message.trim().is_empty() {
            return Err(GitError::EmptyCommitMessage);
        }
        let target = self.safe_relpath(path)?;
        let _guard = self.mutex.lock().await;

        self.run("checkout", &["checkout", &self.branch_dev]).await?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GitError::Step { step: "write", detail: e.to_string() })?;
        }
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| GitError::Step { step: "write", detail: e.to_string() })?;

        self.run("add", &["add", path]).await?;
        self.run("commit", &["commit", "-m", commit_message]).await?;
        self.run("push", &["push", "origin", &self.branch_dev]).await?;

        Ok(format!("committed and pushed to {}: {commit_message}", self.branch_dev))
    }

    /// checkout dev → add (whitelisted paths or -A) → verify non-empty
    /// status → commit → push. Does not rewrite any file itself.
    pub async fn commit_existing_changes(&self, commit_message: &str, paths: Option<&[String]>) -> Result<String, GitError> {
        if commit_message.trim().is_empty() {
            return Err(GitError::EmptyCommitMessage);
        }
        let _guard = self.mutex.lock().await;

        self.run("checkout", &["checkout", &self.branch_dev]).await?;

        match paths {
            Some(paths) if !paths.is_empty() => {
                for p in paths {
                    self.safe_relpath(p)?;
                }
                let mut args = vec!["add"];
                args.extend(paths.iter().map(String::as_str));
                self.run("add", &args).await?;
            }
            _ => {
                self.run("add", &["add", "-A"]).await?;
            }
        }

        let status = self.run("status", &["status", "--porcelain"]).await?;
        if status.trim().is_empty() {
            return Err(GitError::NoChanges);
        }

        self.run("commit", &["commit", "-m", commit_message]).await?;
        self.run("push", &["push", "origin", &self.branch_dev]).await?;

        Ok(format!("committed existing changes and pushed to {}: {commit_message}", self.branch_dev))
    }

    pub async fn status(&self) -> Result<String, GitError> {
        let _guard = self.mutex.lock().await;
        self.run("status", &["status", "--porcelain"]).await
    }

    pub async fn diff(&self) -> Result<String, GitError> {
        let _guard = self.mutex.lock().await;
        self.run("diff", &["diff"]).await
    }

    /// Fast-forward `branch_stable` to `branch_dev`'s HEAD. Caller is
    /// responsible for confirming owner approval before calling this.
    pub async fn promote_to_stable(&self) -> Result<String, GitError> {
        let _guard = self.mutex.lock().await;
        self.run("checkout_stable", &["checkout", &self.branch_stable]).await?;
        self.run("merge", &["merge", "--ff-only", &self.branch_dev]).await?;
        self.run("push_stable", &["push", "origin", &self.branch_stable]).await?;
        self.run("checkout_dev", &["checkout", &self.branch_dev]).await?;
        Ok(format!("promoted {} to {}", self.branch_dev, self.branch_stable))
    }

    /// Startup reset: optionally rescue unpushed commits, then hard-reset
    /// dev to the remote tip. A no-op when `skip` is set.
    pub async fn bootstrap_reset(&self, skip: bool, rescue: RescuePolicy) -> Result<(), GitError> {
        if skip {
            return Ok(());
        }
        let _guard = self.mutex.lock().await;

        self.run("fetch", &["fetch", "origin", &self.branch_dev]).await?;

        if rescue == RescuePolicy::RescueAndReset {
            let local_head = self.run("rev-parse_local", &["rev-parse", "HEAD"]).await.unwrap_or_default();
            let remote_head = self
                .run("rev-parse_remote", &["rev-parse", &format!("origin/{}", self.branch_dev)])
                .await
                .unwrap_or_default();
            if !local_head.is_empty() && local_head != remote_head {
                let tag = format!("refs/rescued/{local_head}");
                let _ = self.run("rescue_tag", &["update-ref", &tag, "HEAD"]).await;
            }
        }

        self.run("checkout", &["checkout", &self.branch_dev]).await?;
        self.run("reset", &["reset", "--hard", &format!("origin/{}", self.branch_dev)]).await?;
        Ok(())
    }
}
