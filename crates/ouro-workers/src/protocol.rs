// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The newline-delimited-JSON protocol spoken over a worker's stdin/stdout.
//! The supervisor writes [`WorkerRequest`] lines; the worker writes
//! [`WorkerResponse`] lines.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    RunTask {
        /// The queue's opaque 8-char task token, carried verbatim over the
        /// wire rather than re-encoded as a number.
        task_id: String,
        task_type: String,
        text: String,
        chat_id: Option<i64>,
        remaining_budget_usd: f64,
    },
    /// Injects an owner message mid-task (only meaningful for `chat` tasks).
    InjectMessage { task_id: String, text: String },
    /// Asks the worker to wind down gracefully within the grace period.
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerResponse {
    Ready,
    Heartbeat { current_task_id: Option<String> },
    TaskDone {
        task_id: String,
        final_text: String,
        usage_json: serde_json::Value,
    },
    TaskFailed { task_id: String, message: String },
    /// A mid-task occurrence the supervisor's event dispatcher must act on
    /// immediately rather than wait for `TaskDone`: a tool asking for a
    /// restart or stable promotion, a schedule/cancel request, a reindex
    /// request, or one round's LLM usage for live budget accounting.
    Event { task_id: String, event: WorkerEvent },
}

/// Mirrors the side effects a worker's tool calls and task loop can raise
/// mid-task. Kept independent of `ouro-tools`/`ouro-model` so this crate's
/// only dependencies remain the wire-protocol ones; the supervisor maps
/// these onto its own richer types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerEvent {
    RestartRequested { reason: String },
    StablePromotionRequested { reason: String },
    TaskScheduled {
        description: String,
        priority: i32,
        run_after_sec: u64,
    },
    TaskCancelled { task_id: String },
    ReindexRequested,
    /// One LLM round's usage, reported as it happens so the supervisor can
    /// enforce the budget without waiting for the task to finish.
    LlmUsage {
        usage_json: serde_json::Value,
        model_id: String,
    },
}

pub fn encode_request(req: &WorkerRequest) -> String {
    let mut line = serde_json::to_string(req).expect("WorkerRequest always serializes");
    line.push('\n');
    line
}

pub fn decode_response(line: &str) -> Result<WorkerResponse, serde_json::Error> {
    serde_json::from_str(line.trim_end())
}

/// The worker-side mirror of [`encode_request`]/[`decode_response`]: the
/// worker process writes [`WorkerResponse`] lines and reads [`WorkerRequest`]
/// lines.
pub fn encode_response(resp: &WorkerResponse) -> String {
    let mut line = serde_json::to_string(resp).expect("WorkerResponse always serializes");
    line.push('\n');
    line
}

pub fn decode_request(line: &str) -> Result<WorkerRequest, serde_json::Error> {
    serde_json::from_str(line.trim_end())
}
