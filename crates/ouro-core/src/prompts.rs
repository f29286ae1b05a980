// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! System-prompt assembly (spec.md §4.5 step 2): loads the repo's persona
//! and world-notes files plus the drive's state snapshot and narration
//! tail, then renders them as a fixed sequence of `system` messages ahead
//! of the user's task text. Every file read is fail-soft — a missing or
//! unreadable file becomes an empty string, never an error, so a corrupted
//! drive never blocks a task from starting.

use std::path::Path;

use ouro_model::Message;

use crate::runtime_context::AgentRuntimeContext;

const FALLBACK_BASE_PROMPT: &str =
    "You are Ouroboros. Your base persona prompt could not be loaded. \
     Analyze available context, help the owner, and report the loading issue.";

/// Last N lines of the narration log kept as self-context (spec.md §4.5
/// step 2's "narration tail").
const NARRATION_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub base_prompt: String,
    pub world_md: String,
    pub readme_md: String,
    pub state_json: String,
    pub narration_tail: String,
}

impl PromptContext {
    /// Reads every source file under `repo_dir`/`drive_root`, substituting
    /// an empty string (or `state_json`'s `"{}"`) on any read failure.
    pub async fn load(repo_dir: &Path, drive_root: &Path) -> Self {
        let base_prompt = safe_read(&repo_dir.join("prompts/BASE.md")).await.unwrap_or_else(|| FALLBACK_BASE_PROMPT.to_string());
        let world_md = safe_read(&repo_dir.join("WORLD.md")).await.unwrap_or_default();
        let readme_md = safe_read(&repo_dir.join("README.md")).await.unwrap_or_default();
        let state_json = safe_read(&drive_root.join("state/state.json")).await.unwrap_or_else(|| "{}".to_string());
        let narration_tail = load_narration_tail(&drive_root.join("logs/narration.jsonl")).await;
        Self { base_prompt, world_md, readme_md, state_json, narration_tail }
    }
}

async fn safe_read(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path).await.ok()
}

async fn load_narration_tail(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let lines: Vec<&str> = contents.lines().collect();
            let start = lines.len().saturating_sub(NARRATION_TAIL_LINES);
            lines[start..].join("\n")
        }
        Err(_) => String::new(),
    }
}

/// Assembles the fixed system-message sequence plus the user's task turn.
/// Section labels are stable identifiers, not prose — downstream log
/// scraping and tests key off them.
pub fn build_messages(ctx: &PromptContext, runtime: &AgentRuntimeContext, task_text: &str) -> Vec<Message> {
    let mut messages = vec![Message::system(ctx.base_prompt.clone())];
    messages.push(labeled_system("WORLD.md", &ctx.world_md));
    messages.push(labeled_system("README.md", &ctx.readme_md));
    messages.push(labeled_system("Drive state (state/state.json)", &ctx.state_json));
    let runtime_json = serde_json::to_string_pretty(&runtime.to_json()).unwrap_or_else(|_| "{}".to_string());
    messages.push(labeled_system("Runtime context (JSON)", &runtime_json));
    messages.push(labeled_system("Recent narration history (logs/narration.jsonl)", &ctx.narration_tail));
    messages.push(Message::user(task_text));
    messages
}

fn labeled_system(label: &str, body: &str) -> Message {
    Message::system(format!("## {label}\n\n{body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_context::AgentRuntimeContext;

    fn sample_runtime() -> AgentRuntimeContext {
        AgentRuntimeContext {
            utc_now: "2026-08-01T00:00:00Z".into(),
            repo_dir: "/repo".into(),
            drive_root: "/drive".into(),
            git_head: Some("abc123".into()),
            git_branch: Some("main".into()),
            task: None,
            context_loading_warnings: vec![],
        }
    }

    #[test]
    fn build_messages_ends_with_the_user_task_turn() {
        let ctx = PromptContext { base_prompt: "persona".into(), ..Default::default() };
        let messages = build_messages(&ctx, &sample_runtime(), "investigate the outage");
        assert_eq!(messages.last().unwrap().text(), "investigate the outage");
        assert_eq!(messages[0].text(), "persona");
    }

    #[test]
    fn labeled_sections_carry_stable_markdown_headers() {
        let ctx = PromptContext { world_md: "notes".into(), ..Default::default() };
        let messages = build_messages(&ctx, &sample_runtime(), "go");
        assert!(messages[1].text().starts_with("## WORLD.md"));
        assert!(messages[1].text().contains("notes"));
    }

    #[tokio::test]
    async fn load_falls_back_to_canned_persona_when_base_prompt_missing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = PromptContext::load(dir.path(), dir.path()).await;
        assert_eq!(ctx.base_prompt, FALLBACK_BASE_PROMPT);
        assert_eq!(ctx.state_json, "{}");
    }

    #[tokio::test]
    async fn load_reads_real_files_when_present() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("prompts")).await.unwrap();
        tokio::fs::write(dir.path().join("prompts/BASE.md"), "custom persona").await.unwrap();
        let ctx = PromptContext::load(dir.path(), dir.path()).await;
        assert_eq!(ctx.base_prompt, "custom persona");
    }

    #[tokio::test]
    async fn narration_tail_keeps_only_the_last_twenty_lines() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("logs")).await.unwrap();
        let lines: Vec<String> = (0..30).map(|i| format!("line{i}")).collect();
        tokio::fs::write(dir.path().join("logs/narration.jsonl"), lines.join("\n")).await.unwrap();
        let ctx = PromptContext::load(dir.path(), dir.path()).await;
        let kept: Vec<&str> = ctx.narration_tail.lines().collect();
        assert_eq!(kept.len(), NARRATION_TAIL_LINES);
        assert_eq!(kept[0], "line10");
        assert_eq!(kept[19], "line29");
    }
}
