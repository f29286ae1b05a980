// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The Task Loop (spec.md §4.5): drives a single task to completion through
//! repeated LLM ↔ tool rounds. Structured the way the teacher's agentic
//! loop is structured — assistant tool-calls pushed first, then every call
//! fanned out or run serially, then results appended in original call
//! order — generalized with the parallel-safe/serial split, per-tool
//! deadlines, and the budget guard this domain adds on top.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ouro_config::{AppConfig, ReasoningEffort};
use ouro_model::{ChatRequest, ImageAttachment, LlmClient, Message, ToolSchema, Usage};
use ouro_tools::ToolRegistry;
use tokio::sync::{mpsc, Semaphore};
use tracing::warn;

use crate::compact::compact_history;
use crate::conversation::ConversationBuffer;
use crate::events::TaskLoopEvent;
use crate::prompts::{build_messages, PromptContext};
use crate::runtime_context::{AgentRuntimeContext, TaskRef};

/// Self-check cadence (spec.md §4.5 step b).
const SELF_CHECK_EVERY: u32 = 20;
/// Round at which effort escalates to `high` (step c).
const ESCALATE_HIGH_AT_ROUND: u32 = 5;
/// Round at which effort escalates to `xhigh` (step c).
const ESCALATE_XHIGH_AT_ROUND: u32 = 10;
/// Concurrency cap for a fully parallel-safe round (step h).
const MAX_PARALLEL_TOOLS: usize = 8;
/// Retry ceiling for a transient LLM failure (step e).
const MAX_LLM_RETRIES: u32 = 3;
/// Backoff cap in seconds (step e).
const MAX_BACKOFF_SEC: u64 = 30;

#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub id: String,
    pub intent: ouro_model::TaskIntent,
    pub text: String,
    pub image: Option<ImageAttachment>,
    pub chat_id: Option<i64>,
}

/// One executed tool call's record, kept for the returned trace (spec.md
/// §4.5 step 4).
#[derive(Debug, Clone)]
pub struct ToolTrace {
    pub name: String,
    pub sanitized_args: String,
    pub truncated_result: String,
    pub is_error: bool,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub final_text: String,
    pub usage: Usage,
    pub trace: Vec<ToolTrace>,
}

pub struct TaskLoop {
    llm: Arc<LlmClient>,
    tools: Arc<ToolRegistry>,
    config: Arc<AppConfig>,
    repo_dir: PathBuf,
    drive_root: PathBuf,
    events: mpsc::UnboundedSender<TaskLoopEvent>,
}

impl TaskLoop {
    pub fn new(
        llm: Arc<LlmClient>,
        tools: Arc<ToolRegistry>,
        config: Arc<AppConfig>,
        repo_dir: PathBuf,
        drive_root: PathBuf,
        events: mpsc::UnboundedSender<TaskLoopEvent>,
    ) -> Self {
        Self { llm, tools, config, repo_dir, drive_root, events }
    }

    fn emit(&self, event: TaskLoopEvent) {
        let _ = self.events.send(event);
    }

    /// Runs `task` to completion against `remaining_budget_usd` (the
    /// supervisor's global remaining budget, captured once at task start —
    /// this task's own spend is tracked against that fixed snapshot, see
    /// DESIGN.md's Open Question note on the budget guard).
    ///
    /// `injected` receives owner messages delivered while this task is
    /// in flight (spec.md §4.5 step a); pass a channel with no sender held
    /// elsewhere to disable injection for this task type.
    pub async fn run(
        &self,
        task: TaskSpec,
        remaining_budget_usd: f64,
        mut injected: mpsc::UnboundedReceiver<String>,
    ) -> TaskOutcome {
        let mut intent = task.intent;
        let profile = ouro_model::select_profile(&self.config.models, intent);
        let mut model_id = profile.model_id.clone();
        let mut effort = profile.effort;

        let prompt_ctx = PromptContext::load(&self.repo_dir, &self.drive_root).await;
        let runtime = AgentRuntimeContext::capture(
            utc_now_iso(),
            self.repo_dir.clone(),
            self.drive_root.clone(),
            Some(TaskRef { id: task.id.clone(), task_type: intent_label(intent).to_string() }),
        )
        .await;

        let mut buffer = ConversationBuffer::new();
        for msg in build_messages(&prompt_ctx, &runtime, &task.text) {
            buffer_push(&mut buffer, msg);
        }

        let mut usage = Usage::default();
        let mut round: u32 = 0;
        let mut error_count_this_round;
        let mut trace = Vec::new();
        let tool_schemas = schemas_for(&self.tools);

        loop {
            round += 1;

            // a. drain owner-injection channel, preserving arrival order.
            while let Ok(msg) = injected.try_recv() {
                buffer.push_user(msg);
            }

            // b. self-check every 20 rounds.
            if round > 1 && round % SELF_CHECK_EVERY == 0 {
                let cache_hit_pct = usage.cache_hit_pct();
                buffer.push_system(format!(
                    "Self-check: {round} rounds elapsed, ${:.4} spent, {} prompt tokens, {:.1}% cache hit rate. \
                     Reassess whether the current approach is still the right one.",
                    usage.cost_usd, usage.prompt_tokens, cache_hit_pct
                ));
                self.emit(TaskLoopEvent::SelfCheck {
                    round,
                    spent_usd: usage.cost_usd,
                    prompt_tokens: usage.prompt_tokens,
                    cache_hit_pct,
                });
            }

            // c. monotonic effort escalation.
            if round >= ESCALATE_XHIGH_AT_ROUND {
                effort = effort.escalate(ReasoningEffort::Xhigh);
            } else if round >= ESCALATE_HIGH_AT_ROUND {
                effort = effort.escalate(ReasoningEffort::High);
            }

            // d. compact history.
            let mut messages = buffer.to_vec();
            let collapsed = if round > 1 { compact_history(&mut messages) } else { 0 };
            if collapsed > 0 {
                buffer.replace(messages.clone());
                self.emit(TaskLoopEvent::ContextCompacted { round, collapsed });
            }

            // e. call the LLM, retrying transient failures.
            let req = ChatRequest {
                model_id: model_id.clone(),
                messages,
                tools: tool_schemas.clone(),
                effort,
                max_tokens: profile_max_tokens(&self.config, intent),
                cache_tools: true,
            };
            let response = match self.call_with_retry(req).await {
                Ok(r) => r,
                Err(e) => {
                    return TaskOutcome {
                        final_text: format!("⚠️ task failed after {MAX_LLM_RETRIES} retries: {e}"),
                        usage,
                        trace,
                    }
                }
            };

            // f. accumulate usage, emit llm_round.
            usage.add(&response.usage);
            self.emit(TaskLoopEvent::LlmRound { round, effort, usage: response.usage });

            buffer.push_assistant(&response);

            // g. no tool calls → done.
            if !response.has_tool_calls() {
                self.emit(TaskLoopEvent::TaskComplete { rounds: round, usage });
                return TaskOutcome { final_text: response.content, usage, trace };
            }

            // h. classify and execute.
            let calls = response.tool_calls.clone();
            let all_parallel_safe = calls.iter().all(|c| self.tools.is_parallel_safe(&c.name));
            for c in &calls {
                self.emit(TaskLoopEvent::ToolCallStarted { call_id: c.id.clone(), tool_name: c.name.clone() });
            }
            let results = if all_parallel_safe {
                self.execute_parallel(&calls).await
            } else {
                self.execute_serial(&calls).await
            };

            error_count_this_round = 0;
            let mut any_mutating = false;
            for (call, outcome) in calls.iter().zip(results.iter()) {
                let (content, is_error, timed_out) = outcome;
                if *timed_out {
                    self.emit(TaskLoopEvent::ToolTimeout {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        timeout_sec: self.tools.timeout_for(&call.name).unwrap_or(30),
                    });
                }
                self.emit(TaskLoopEvent::ToolCallFinished {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    is_error: *is_error,
                });
                if *is_error {
                    error_count_this_round += 1;
                }
                if !*is_error && self.tools.is_code_mutating(&call.name) {
                    any_mutating = true;
                }
                trace.push(ToolTrace {
                    name: call.name.clone(),
                    sanitized_args: call.arguments_json.clone(),
                    truncated_result: content.clone(),
                    is_error: *is_error,
                });
            }

            // i. append tool results in original call order.
            for (call, (content, _, _)) in calls.iter().zip(results.iter()) {
                buffer.push_tool_result(call.id.clone(), content.clone());
            }

            // j. switch to code_task profile, monotonic.
            if any_mutating && intent != ouro_model::TaskIntent::CodeTask {
                intent = ouro_model::TaskIntent::CodeTask;
                let new_profile = ouro_model::select_profile(&self.config.models, intent);
                model_id = new_profile.model_id.clone();
                effort = effort.escalate(new_profile.effort);
                self.emit(TaskLoopEvent::ProfileSwitchedToCodeTask { round });
            }

            // k. error-count escalation.
            if error_count_this_round >= 4 {
                effort = effort.escalate(ReasoningEffort::Xhigh);
            } else if error_count_this_round >= 2 {
                effort = effort.escalate(ReasoningEffort::High);
            }

            // l. budget guard.
            let ratio = if remaining_budget_usd > 0.0 { usage.cost_usd / remaining_budget_usd } else { 1.0 };
            if ratio > 0.5 {
                self.emit(TaskLoopEvent::BudgetGuard { round, ratio, forced_closure: true });
                buffer.push_system(
                    "BUDGET LIMIT: this task has consumed more than half of the remaining budget. \
                     Do not call any more tools. Write a concise closing answer summarizing what was \
                     accomplished and what remains.",
                );
                let closing = self.final_no_tools_call(&buffer, &model_id, effort).await;
                match closing {
                    Ok(resp) => {
                        usage.add(&resp.usage);
                        self.emit(TaskLoopEvent::TaskComplete { rounds: round, usage });
                        return TaskOutcome { final_text: resp.content, usage, trace };
                    }
                    Err(e) => {
                        self.emit(TaskLoopEvent::TaskComplete { rounds: round, usage });
                        return TaskOutcome {
                            final_text: format!("⚠️ budget limit reached and closing call failed: {e}"),
                            usage,
                            trace,
                        };
                    }
                }
            } else if ratio > 0.3 && round % 10 == 0 {
                self.emit(TaskLoopEvent::BudgetGuard { round, ratio, forced_closure: false });
                buffer.push_system(
                    "Budget nudge: more than 30% of the remaining budget has been spent on this task. \
                     Consider wrapping up soon.",
                );
            }
        }
    }

    async fn final_no_tools_call(
        &self,
        buffer: &ConversationBuffer,
        model_id: &str,
        effort: ReasoningEffort,
    ) -> Result<ouro_model::ChatResponse, ouro_model::ModelError> {
        let req = ChatRequest {
            model_id: model_id.to_string(),
            messages: buffer.to_vec(),
            tools: vec![],
            effort,
            max_tokens: 2048,
            cache_tools: false,
        };
        self.llm.chat(req).await
    }

    async fn call_with_retry(&self, req: ChatRequest) -> Result<ouro_model::ChatResponse, ouro_model::ModelError> {
        let mut attempt = 0;
        loop {
            match self.llm.chat(req.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_transient() && attempt < MAX_LLM_RETRIES => {
                    attempt += 1;
                    let backoff = (2u64.pow(attempt)).min(MAX_BACKOFF_SEC);
                    warn!(attempt, backoff_sec = backoff, error = %e, "transient LLM failure, retrying");
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Executes every call concurrently, capped at [`MAX_PARALLEL_TOOLS`],
    /// each wrapped in its own deadline (step h). Returns
    /// `(content, is_error, timed_out)` per call, in the original order.
    async fn execute_parallel(&self, calls: &[ouro_model::ToolCall]) -> Vec<(String, bool, bool)> {
        let semaphore = Arc::new(Semaphore::new(MAX_PARALLEL_TOOLS.min(calls.len().max(1))));
        let mut handles = Vec::with_capacity(calls.len());
        for call in calls {
            let tools = Arc::clone(&self.tools);
            let sem = Arc::clone(&semaphore);
            let id = call.id.clone();
            let name = call.name.clone();
            let args = call.arguments_json.clone();
            let timeout_sec = tools.timeout_for(&name).unwrap_or(30);
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore not closed");
                run_one(&tools, &id, &name, &args, timeout_sec).await
            }));
        }
        let mut out = Vec::with_capacity(handles.len());
        for h in handles {
            out.push(h.await.unwrap_or_else(|e| (format!("⚠️ tool panicked: {e}"), true, false)));
        }
        out
    }

    async fn execute_serial(&self, calls: &[ouro_model::ToolCall]) -> Vec<(String, bool, bool)> {
        let mut out = Vec::with_capacity(calls.len());
        for call in calls {
            let timeout_sec = self.tools.timeout_for(&call.name).unwrap_or(30);
            out.push(run_one(&self.tools, &call.id, &call.name, &call.arguments_json, timeout_sec).await);
        }
        out
    }
}

/// Runs one call under its registered deadline. On expiry the handler is
/// abandoned (the registry's future is simply dropped, matching spec.md
/// §4.5 step h's "the hung handler thread is abandoned as a daemon").
async fn run_one(tools: &ToolRegistry, id: &str, name: &str, args: &str, timeout_sec: u64) -> (String, bool, bool) {
    match tokio::time::timeout(Duration::from_secs(timeout_sec), tools.execute(id, name, args)).await {
        Ok((content, is_error)) => (content, is_error, false),
        Err(_) => (format!("⚠️ TOOL_TIMEOUT: {name} exceeded {timeout_sec}s"), true, true),
    }
}

fn buffer_push(buffer: &mut ConversationBuffer, msg: Message) {
    match msg.role {
        ouro_model::Role::System => buffer.push_system(msg.text()),
        ouro_model::Role::User => buffer.push_user(msg.text()),
        _ => {}
    }
}

fn schemas_for(tools: &ToolRegistry) -> Vec<ToolSchema> {
    tools
        .schemas()
        .into_iter()
        .map(|s| ToolSchema { name: s.name, description: s.description, json_schema: s.parameters })
        .collect()
}

fn profile_max_tokens(config: &AppConfig, intent: ouro_model::TaskIntent) -> u32 {
    ouro_model::select_profile(&config.models, intent).default_max_tokens
}

fn intent_label(intent: ouro_model::TaskIntent) -> &'static str {
    match intent {
        ouro_model::TaskIntent::Default => "chat",
        ouro_model::TaskIntent::Light => "light",
        ouro_model::TaskIntent::CodeTask => "code",
        ouro_model::TaskIntent::Analysis => "analysis",
        ouro_model::TaskIntent::Consciousness => "consciousness",
    }
}

fn utc_now_iso() -> String {
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    format!("unix:{}", now.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ouro_model::ToolCall as ModelToolCall;
    use ouro_tools::{Tool, ToolOutput};
    use std::collections::HashMap;

    fn sample_config() -> AppConfig {
        let mut providers = HashMap::new();
        providers.insert(
            "mock".to_string(),
            ouro_config::ProviderConfig {
                name: "mock".into(),
                api_key: Some("k".into()),
                base_url: None,
                requires_reasoning_effort: false,
                supports_prompt_caching: false,
            },
        );
        let profile = ouro_config::ModelProfile {
            model_id: "mock/test".into(),
            effort: ReasoningEffort::Low,
            default_max_tokens: 2048,
        };
        AppConfig {
            runtime_dir: "/tmp".into(),
            repo_dir: "/tmp/repo".into(),
            chat_bot_token: "t".into(),
            total_budget_usd: 50.0,
            max_workers: 2,
            soft_timeout_sec: 600,
            hard_timeout_sec: 1800,
            branch_dev: "ouroboros".into(),
            branch_stable: "ouroboros-stable".into(),
            poll_timeout_sec: 15,
            loop_sleep_sec: 0.2,
            heartbeat_sec: 60,
            skip_bootstrap_reset: false,
            disable_auto_rescue: false,
            max_tool_rounds: 200,
            llm_max_retries: 3,
            providers,
            models: ouro_config::ModelProfiles {
                default: profile.clone(),
                light: profile.clone(),
                code_task: profile.clone(),
                analysis: profile.clone(),
                consciousness: profile,
            },
            remote_url: None,
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "repo_read"
        }
        fn description(&self) -> &str {
            "reads"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        fn is_parallel_safe(&self) -> bool {
            true
        }
        async fn execute(&self, call: &ouro_tools::ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, "contents")
        }
    }

    #[tokio::test]
    async fn execute_parallel_runs_within_cap_and_preserves_order() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        let reg = Arc::new(reg);
        let config = Arc::new(sample_config());
        let llm = Arc::new(LlmClient::new((*config).clone()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let task_loop = TaskLoop::new(llm, reg, config, "/tmp/repo".into(), "/tmp/drive".into(), tx);

        let calls: Vec<ModelToolCall> = (0..3)
            .map(|i| ModelToolCall { id: format!("c{i}"), name: "repo_read".into(), arguments_json: "{}".into() })
            .collect();
        let results = task_loop.execute_parallel(&calls).await;
        assert_eq!(results.len(), 3);
        for (content, is_error, timed_out) in &results {
            assert_eq!(content, "contents");
            assert!(!is_error);
            assert!(!timed_out);
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "never returns in time"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        fn timeout_sec(&self) -> u64 {
            0
        }
        async fn execute(&self, call: &ouro_tools::ToolCall) -> ToolOutput {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ToolOutput::ok(&call.id, "too late")
        }
    }

    #[tokio::test]
    async fn run_one_reports_tool_timeout_on_deadline_expiry() {
        let mut reg = ToolRegistry::new();
        reg.register(SlowTool);
        let (content, is_error, timed_out) = run_one(&reg, "c1", "slow", "{}", 0).await;
        assert!(timed_out);
        assert!(is_error);
        assert!(content.contains("TOOL_TIMEOUT"));
    }
}
