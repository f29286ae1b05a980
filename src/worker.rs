// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Worker-process mode: the child side of the Worker Pool (spec.md §4.6).
//! Reads [`WorkerRequest`] lines from stdin, drives each `RunTask` through
//! the Task Loop, and writes [`WorkerResponse`] lines to stdout. Per-call
//! narration and tool records are appended straight to the shared runtime
//! directory's event log rather than routed back through the supervisor —
//! the log is opened append-only, which is safe across concurrent workers.

use std::sync::Arc;

use ouro_core::{ConsciousnessHandle, NullConsciousness, TaskLoop, TaskSpec};
use ouro_git::GitCoordinator;
use ouro_model::{LlmClient, TaskIntent};
use ouro_state::StateStore;
use ouro_tools::{
    CancelTaskTool, ChatHistoryTool, CodebaseDigestTool, DriveListTool, DriveReadTool,
    DriveWriteTool, EventSink, GitDiffTool, GitStatusTool, PendingEvent, ReindexRequestTool,
    RepoCommitPushTool, RepoListTool, RepoReadTool, RepoWriteCommitTool, RequestRestartTool,
    RequestStablePromotionTool, RunShellTool, ScheduleTaskTool, ToolRegistry, VisionQueryTool,
    WebSearchTool,
};
use ouro_workers::{decode_request, encode_response, WorkerEvent, WorkerRequest, WorkerResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

fn task_intent_for(task_type: &str) -> TaskIntent {
    match task_type {
        "code" => TaskIntent::CodeTask,
        "analysis" => TaskIntent::Analysis,
        "light" => TaskIntent::Light,
        "consciousness" => TaskIntent::Consciousness,
        _ => TaskIntent::Default,
    }
}

/// Bridges `ouro_tools`'s synchronous [`EventSink::emit`] into the worker's
/// outbound response channel; each raised event becomes a
/// `WorkerResponse::Event` line as soon as the tool call returns.
struct ForwardingSink {
    task_id: String,
    tx: mpsc::UnboundedSender<WorkerResponse>,
}

impl EventSink for ForwardingSink {
    fn emit(&self, event: PendingEvent) {
        let mapped = match event {
            PendingEvent::RestartRequested { reason } => WorkerEvent::RestartRequested { reason },
            PendingEvent::StablePromotionRequested { reason } => {
                WorkerEvent::StablePromotionRequested { reason }
            }
            PendingEvent::TaskScheduled { description, priority, run_after_sec } => {
                WorkerEvent::TaskScheduled { description, priority, run_after_sec }
            }
            PendingEvent::TaskCancelled { task_id } => WorkerEvent::TaskCancelled { task_id },
            PendingEvent::ReindexRequested => WorkerEvent::ReindexRequested,
        };
        let _ = self.tx.send(WorkerResponse::Event { task_id: self.task_id.clone(), event: mapped });
    }
}

fn build_tool_registry(
    config: &ouro_config::AppConfig,
    git: Arc<GitCoordinator>,
    llm: Arc<LlmClient>,
    events: Arc<dyn EventSink>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(RepoReadTool { repo_dir: config.repo_dir.clone() });
    registry.register(RepoListTool { repo_dir: config.repo_dir.clone() });
    registry.register(RepoWriteCommitTool { git: git.clone() });
    registry.register(RepoCommitPushTool { git: git.clone() });
    registry.register(GitDiffTool { git: git.clone() });
    registry.register(GitStatusTool { git: git.clone() });
    registry.register(RunShellTool { repo_dir: config.repo_dir.clone(), git: git.clone() });
    registry.register(DriveReadTool { drive_root: config.memory_dir() });
    registry.register(DriveListTool { drive_root: config.memory_dir() });
    registry.register(DriveWriteTool { drive_root: config.memory_dir() });
    registry.register(ChatHistoryTool { chat_log_path: config.logs_dir().join("chat_log.jsonl") });
    registry.register(CodebaseDigestTool { repo_dir: config.repo_dir.clone() });
    registry.register(VisionQueryTool {
        model: llm.clone(),
        drive_root: config.memory_dir(),
        model_id: config.models.default.model_id.clone(),
    });
    let web_search_key = config.providers.get("openai").and_then(|p| p.api_key.clone());
    registry.register(WebSearchTool::new(web_search_key));
    registry.register(CancelTaskTool { events: events.clone() });
    registry.register(ScheduleTaskTool { events: events.clone() });
    registry.register(RequestRestartTool { events: events.clone() });
    registry.register(RequestStablePromotionTool { events: events.clone() });
    registry.register(ReindexRequestTool { events });
    registry
}

/// True once a task's final text carries the task loop's own failure
/// marker; `TaskLoop::run` never returns an `Err`, it encodes failure into
/// the text itself (spec.md §4.5 step e).
fn looks_failed(final_text: &str) -> bool {
    final_text.starts_with("⚠️ task failed")
}

pub async fn run() -> anyhow::Result<()> {
    let config = Arc::new(ouro_config::load()?);
    let git = Arc::new(GitCoordinator::new(
        config.repo_dir.clone(),
        config.branch_dev.clone(),
        config.branch_stable.clone(),
    ));
    let llm = Arc::new(LlmClient::new((*config).clone()));
    let state =
        Arc::new(StateStore::load(config.runtime_dir.clone(), "worker".into(), config.total_budget_usd).await);
    let consciousness: Arc<dyn ConsciousnessHandle> = Arc::new(NullConsciousness);

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    let (resp_tx, mut resp_rx) = mpsc::unbounded_channel::<WorkerResponse>();
    let mut current_injection: Option<(String, mpsc::UnboundedSender<String>)> = None;

    let ready = encode_response(&WorkerResponse::Ready);
    stdout.write_all(ready.as_bytes()).await?;
    stdout.flush().await?;

    loop {
        tokio::select! {
            resp = resp_rx.recv() => {
                match resp {
                    Some(r) => {
                        let line = encode_response(&r);
                        if stdout.write_all(line.as_bytes()).await.is_err() {
                            break;
                        }
                        let _ = stdout.flush().await;
                    }
                    None => break,
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let req = match decode_request(&line) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "malformed worker request, ignoring");
                        continue;
                    }
                };
                match req {
                    WorkerRequest::RunTask { task_id, task_type, text, chat_id, remaining_budget_usd } => {
                        let (inject_tx, inject_rx) = mpsc::unbounded_channel::<String>();
                        current_injection = Some((task_id.clone(), inject_tx));

                        let events: Arc<dyn EventSink> =
                            Arc::new(ForwardingSink { task_id: task_id.clone(), tx: resp_tx.clone() });
                        let registry = build_tool_registry(&config, git.clone(), llm.clone(), events);
                        let (task_events_tx, mut task_events_rx) = mpsc::unbounded_channel();
                        let task_loop = TaskLoop::new(
                            llm.clone(),
                            Arc::new(registry),
                            config.clone(),
                            config.repo_dir.clone(),
                            config.memory_dir(),
                            task_events_tx,
                        );

                        let spec = TaskSpec {
                            id: task_id.to_string(),
                            intent: task_intent_for(&task_type),
                            text,
                            image: None,
                            chat_id,
                        };

                        let resp_tx2 = resp_tx.clone();
                        let state2 = state.clone();
                        let consciousness2 = consciousness.clone();
                        let config_for_task = config.clone();
                        tokio::spawn(async move {
                            // Forward per-round events into the shared log and, for
                            // LLM usage, back to the supervisor for live accounting.
                            let forward_task_id = task_id.clone();
                            let resp_tx3 = resp_tx2.clone();
                            let state3 = state2.clone();
                            tokio::spawn(async move {
                                while let Some(ev) = task_events_rx.recv().await {
                                    let _ = state3
                                        .append_event("tools", serde_json::json!({"task_id": forward_task_id, "event": format!("{ev:?}")}))
                                        .await;
                                    if let ouro_core::TaskLoopEvent::LlmRound { usage, .. } = &ev {
                                        let _ = resp_tx3.send(WorkerResponse::Event {
                                            task_id: forward_task_id.clone(),
                                            event: WorkerEvent::LlmUsage {
                                                usage_json: serde_json::to_value(usage).unwrap_or_default(),
                                                model_id: config_for_task.models.default.model_id.clone(),
                                            },
                                        });
                                    }
                                }
                            });

                            let outcome = task_loop.run(spec, remaining_budget_usd, inject_rx).await;
                            consciousness2.emit(&format!("task {task_id} finished"));
                            let usage_json = serde_json::to_value(&outcome.usage).unwrap_or_default();
                            let resp = if looks_failed(&outcome.final_text) {
                                WorkerResponse::TaskFailed { task_id, message: outcome.final_text }
                            } else {
                                WorkerResponse::TaskDone { task_id, final_text: outcome.final_text, usage_json }
                            };
                            let _ = resp_tx2.send(resp);
                        });
                    }
                    WorkerRequest::InjectMessage { task_id, text } => {
                        if let Some((current_id, tx)) = &current_injection {
                            if *current_id == task_id {
                                let _ = tx.send(text);
                            }
                        }
                    }
                    WorkerRequest::Shutdown => {
                        info!("worker received shutdown request, draining in-flight task");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
