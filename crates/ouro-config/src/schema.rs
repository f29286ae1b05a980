// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Provider credentials and endpoint, resolved once at startup and immutable
/// for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub requires_reasoning_effort: bool,
    pub supports_prompt_caching: bool,
}

/// A model id plus the reasoning-effort tier and token ceiling to use for a
/// given task-intent. Keyed by the tags in [`ModelProfiles`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    pub model_id: String,
    pub effort: ReasoningEffort,
    pub default_max_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
    Xhigh,
}

impl ReasoningEffort {
    /// Escalate towards `other`, never downgrading. Mirrors the "monotonic"
    /// effort-escalation rule used by the task loop.
    pub fn escalate(self, other: ReasoningEffort) -> ReasoningEffort {
        self.max(other)
    }
}

/// Model id assigned per task-intent tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfiles {
    pub default: ModelProfile,
    pub light: ModelProfile,
    pub code_task: ModelProfile,
    pub analysis: ModelProfile,
    pub consciousness: ModelProfile,
}

/// Full supervisor configuration, loaded once at startup from environment
/// variables per the CLI surface in spec.md §6. There is no config file: the
/// source this behavior is grounded on (`supervisor/main.py::load_config`)
/// reads exclusively from `os.environ`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory for durable runtime state (state/, logs/, locks/, …).
    pub runtime_dir: std::path::PathBuf,
    /// Path to the git working tree the agent reads and writes.
    pub repo_dir: std::path::PathBuf,
    /// Chat bot token (e.g. a Telegram bot token).
    pub chat_bot_token: String,
    /// Dollar ceiling for cumulative LLM spend across this runtime's lifetime.
    pub total_budget_usd: f64,
    /// Number of worker OS processes to maintain.
    pub max_workers: usize,
    /// Soft per-task deadline; past this the task receives an injected nudge.
    pub soft_timeout_sec: u64,
    /// Hard per-task deadline; past this the task is force-terminated.
    pub hard_timeout_sec: u64,
    pub branch_dev: String,
    pub branch_stable: String,
    /// Long-poll timeout for the chat transport, seconds.
    pub poll_timeout_sec: u64,
    /// Sleep between supervisor main-loop iterations, seconds (fractional).
    pub loop_sleep_sec: f64,
    /// Interval between heartbeat log lines, seconds.
    pub heartbeat_sec: u64,
    /// Skip the bootstrap-time git reset entirely.
    pub skip_bootstrap_reset: bool,
    /// Disable the rescue_and_reset policy; fall back to plain ignore.
    pub disable_auto_rescue: bool,
    /// Hard ceiling on Task Loop rounds before forced return.
    pub max_tool_rounds: u32,
    /// Max LLM transient-error retries before giving up on a round.
    pub llm_max_retries: u32,
    /// Providers keyed by canonical name (anthropic, openai, google, zai,
    /// opencode, codex).
    pub providers: HashMap<String, ProviderConfig>,
    pub models: ModelProfiles,
    /// Git remote URL, built from GITHUB_USER/GITHUB_REPO/GITHUB_TOKEN when
    /// those are present; `None` disables push operations (local-only repo).
    pub remote_url: Option<String>,
}

impl AppConfig {
    pub fn state_dir(&self) -> std::path::PathBuf {
        self.runtime_dir.join("state")
    }
    pub fn logs_dir(&self) -> std::path::PathBuf {
        self.runtime_dir.join("logs")
    }
    pub fn locks_dir(&self) -> std::path::PathBuf {
        self.runtime_dir.join("locks")
    }
    pub fn queue_dir(&self) -> std::path::PathBuf {
        self.runtime_dir.join("queue")
    }
    pub fn tmp_dir(&self) -> std::path::PathBuf {
        self.runtime_dir.join("tmp")
    }
    pub fn memory_dir(&self) -> std::path::PathBuf {
        self.runtime_dir.join("memory")
    }
    pub fn task_results_dir(&self) -> std::path::PathBuf {
        self.runtime_dir.join("task_results")
    }

    /// Every directory `AppConfig` expects to exist, created on first touch.
    pub fn runtime_dirs(&self) -> Vec<std::path::PathBuf> {
        vec![
            self.state_dir(),
            self.logs_dir(),
            self.locks_dir(),
            self.queue_dir(),
            self.tmp_dir(),
            self.memory_dir(),
            self.task_results_dir(),
        ]
    }
}
