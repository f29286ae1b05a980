// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Events emitted by the Task Loop as it drives one task to completion.
//! The Worker Pool forwards these on its shared event channel; the
//! Supervisor's narration log is one consumer, the owner-facing chat
//! transport is another.

use ouro_config::ReasoningEffort;
use ouro_model::Usage;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskLoopEvent {
    /// One LLM round completed (spec.md §4.5 step f).
    LlmRound { round: u32, effort: ReasoningEffort, usage: Usage },
    /// Emitted every 20 rounds alongside the injected self-check message
    /// (spec.md §4.5 step b).
    SelfCheck { round: u32, spent_usd: f64, prompt_tokens: u64, cache_hit_pct: f64 },
    ToolCallStarted { call_id: String, tool_name: String },
    ToolCallFinished { call_id: String, tool_name: String, is_error: bool },
    /// A tool call was abandoned after exceeding its registered timeout
    /// (spec.md §4.5 step h).
    ToolTimeout { call_id: String, tool_name: String, timeout_sec: u64 },
    /// History was compacted; `collapsed` counts replaced tool results.
    ContextCompacted { round: u32, collapsed: usize },
    /// The budget guard fired (spec.md §4.5 step l).
    BudgetGuard { round: u32, ratio: f64, forced_closure: bool },
    /// The profile switched to `code_task` after a code-mutating tool call
    /// completed (spec.md §4.5 step j).
    ProfileSwitchedToCodeTask { round: u32 },
    TaskComplete { rounds: u32, usage: Usage },
}
