// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Supervisor Main (C10) and the Event Dispatcher (C8): the singleton-locked
//! long-poll loop that owns the chat transport, task queue, worker pool, and
//! git coordinator for the process lifetime.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ouro_chat::{ChatTransport, ChatUpdate, TelegramTransport};
use ouro_config::AppConfig;
use ouro_core::{ConsciousnessHandle, NullConsciousness};
use ouro_git::{GitCoordinator, RescuePolicy};
use ouro_queue::{Priority, Task, TaskId, TaskQueue, TaskStatus, TimeoutAction};
use ouro_state::{LockFile, StateError, StateStore};
use ouro_workers::{WorkerEvent, WorkerPool, WorkerRequest, WorkerResponse};
use tracing::{debug, info, warn};

/// Cap on the in-memory update-id dedup ring (spec.md §4.10 step 2).
const DEDUP_RING_CAP: usize = 4000;
/// Cap on events drained from the worker pool per main-loop tick.
const EVENTS_PER_TICK: usize = 200;
/// Grace period given a worker between stop signal and force-kill.
const WORKER_KILL_GRACE: Duration = Duration::from_secs(10);
/// How long a worker may go without a heartbeat before it's considered stale.
const WORKER_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(120);
/// Fixed interval between automatic evolution-mode task enqueues.
const EVOLUTION_INTERVAL: Duration = Duration::from_secs(3600);

pub async fn run() -> anyhow::Result<()> {
    let config = Arc::new(ouro_config::load()?);
    for dir in config.runtime_dirs() {
        tokio::fs::create_dir_all(&dir).await?;
    }

    let lock_path = config.locks_dir().join("supervisor_main.lock");
    let now = chrono::Utc::now().to_rfc3339();
    let mut lock = match LockFile::acquire(&lock_path, &now) {
        Ok(lock) => lock,
        Err(StateError::LockHeld(pid)) => {
            info!(pid, "singleton lock held by a live supervisor, exiting");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    let state = Arc::new(StateStore::load(config.runtime_dir.clone(), session_id, config.total_budget_usd).await);
    let chat: Arc<dyn ChatTransport> = Arc::new(TelegramTransport::new(config.chat_bot_token.clone()));
    let git = Arc::new(GitCoordinator::new(
        config.repo_dir.clone(),
        config.branch_dev.clone(),
        config.branch_stable.clone(),
    ));

    let rescue = if config.disable_auto_rescue {
        RescuePolicy::Ignore
    } else {
        RescuePolicy::RescueAndReset
    };
    if let Err(e) = git.bootstrap_reset(config.skip_bootstrap_reset, rescue).await {
        warn!(error = %e, "bootstrap reset failed, continuing fail-open");
    }

    let worker_cmd = std::env::current_exe()?;
    let mut pool = WorkerPool::new(worker_cmd, vec!["--worker".into()]);
    let queue = restore_queue(&config).await;
    pool.spawn_all(config.max_workers as u32);

    let consciousness: Arc<dyn ConsciousnessHandle> = Arc::new(NullConsciousness);

    let mut sup = Supervisor {
        config,
        state,
        chat,
        git,
        pool,
        queue,
        dedup_seen: HashSet::new(),
        dedup_order: VecDeque::new(),
        task_to_worker: HashMap::new(),
        consciousness,
        last_heartbeat_logged: Instant::now(),
        last_evolution_task: Instant::now(),
        pending_stable_promotion: None,
        shutdown_requested: false,
    };

    let result = sup.main_loop().await;

    sup.pool.shutdown_all(WORKER_KILL_GRACE).await;
    let _ = sup.state.save().await;
    let _ = save_task_registry(&sup.config, &sup.queue).await;
    let _ = sup.queue.save_snapshot(&sup.config.queue_dir().join("snapshot.json")).await;
    lock.release();

    result
}

struct Supervisor {
    config: Arc<AppConfig>,
    state: Arc<StateStore>,
    chat: Arc<dyn ChatTransport>,
    git: Arc<GitCoordinator>,
    pool: WorkerPool,
    queue: TaskQueue,
    dedup_seen: HashSet<i64>,
    dedup_order: VecDeque<i64>,
    /// Maps a running task to the worker currently executing it, so
    /// deadline enforcement and crash recovery know who to signal.
    task_to_worker: HashMap<TaskId, u32>,
    consciousness: Arc<dyn ConsciousnessHandle>,
    last_heartbeat_logged: Instant,
    last_evolution_task: Instant,
    /// Reason string while a stable-promotion approval prompt is outstanding.
    pending_stable_promotion: Option<String>,
    shutdown_requested: bool,
}

impl Supervisor {
    async fn main_loop(&mut self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = shutdown_signal() => {
                    info!("shutdown signal received");
                    break;
                }
                _ = self.tick() => {
                    if self.shutdown_requested {
                        info!("restart requested by a worker, shutting down for process supervisor to relaunch");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn tick(&mut self) {
        self.poll_chat().await;
        self.drain_events().await;
        self.assign_and_enforce().await;
        self.log_heartbeat_if_due().await;
        self.evolution_probe_if_due();
        tokio::time::sleep(Duration::from_secs_f64(self.config.loop_sleep_sec)).await;
    }

    async fn poll_chat(&mut self) {
        let offset = self.state.snapshot().await.tg_offset;
        let updates = match self.chat.poll_updates(offset, self.config.poll_timeout_sec).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "chat long-poll failed");
                return;
            }
        };
        for update in updates {
            self.handle_update(update).await;
        }
    }

    async fn handle_update(&mut self, update: ChatUpdate) {
        if !self.dedup_seen.insert(update.update_id) {
            return;
        }
        self.dedup_order.push_back(update.update_id);
        if self.dedup_order.len() > DEDUP_RING_CAP {
            if let Some(oldest) = self.dedup_order.pop_front() {
                self.dedup_seen.remove(&oldest);
            }
        }

        let next_offset = update.update_id + 1;
        let _ = self.state.update(|s| {
            if s.tg_offset < next_offset {
                s.tg_offset = next_offset;
            }
            s.owner_id.get_or_insert(update.from_id);
        }).await;

        let snap = self.state.snapshot().await;
        if snap.owner_id != Some(update.from_id) {
            debug!(from = update.from_id, "rejecting message from non-owner");
            let _ = self.chat.send_message(update.chat_id, "Not authorized", None).await;
            return;
        }

        let _ = self.state.update(|s| {
            s.owner_chat_id = Some(update.chat_id);
            s.last_owner_message_at = Some(chrono::Utc::now().to_rfc3339());
        }).await;

        let Some(text) = update.message_text().map(str::to_string) else {
            return;
        };

        if let Some(reply) = self.handle_owner_command(&text).await {
            let _ = self.chat.send_message(update.chat_id, &reply, None).await;
            return;
        }

        self.dispatch_message(update.chat_id, text).await;
    }

    /// Returns `Some(reply)` if `text` was a recognized `/command`; the
    /// caller sends the reply and does not enqueue a task.
    async fn handle_owner_command(&mut self, text: &str) -> Option<String> {
        let trimmed = text.trim();
        if let Some(reason) = self.pending_stable_promotion.clone() {
            if trimmed.eq_ignore_ascii_case("approve") {
                self.pending_stable_promotion = None;
                return Some(match self.git.promote_to_stable().await {
                    Ok(sha) => format!("promoted to stable at {sha}"),
                    Err(e) => format!("promotion failed: {e}"),
                });
            }
            if trimmed.eq_ignore_ascii_case("deny") {
                self.pending_stable_promotion = None;
                return Some(format!("stable promotion denied ({reason})"));
            }
        }

        if !trimmed.starts_with('/') {
            return None;
        }
        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let cmd = parts.next().unwrap_or("");
        let arg = parts.next().unwrap_or("").trim();

        match cmd {
            "/start" | "/help" => Some(
                "commands: /status /queue /cancel <id> /evolve start|stop /help".to_string(),
            ),
            "/status" => {
                let snap = self.state.snapshot().await;
                Some(format!(
                    "pending: {} | running: {} | spent: ${:.2} / ${:.2} | workers: {}",
                    self.queue.pending_len(),
                    self.queue.running_len(),
                    snap.spent_usd,
                    snap.budget_total_usd,
                    self.pool.worker_count(),
                ))
            }
            "/queue" => Some(format!(
                "Pending: {} | Running: {}",
                self.queue.pending_len(),
                self.queue.running_len()
            )),
            "/cancel" => {
                let target = arg.parse::<TaskId>().ok();
                let cancelled = target.and_then(|id| self.queue.cancel(id).ok());
                Some(match cancelled {
                    Some(()) => format!("OK: {arg}"),
                    None => format!("Not found: {arg}"),
                })
            }
            "/evolve" => match arg {
                "start" => {
                    let _ = self.state.update(|s| s.evolution_mode_enabled = true).await;
                    Some("evolution mode enabled".to_string())
                }
                "stop" => {
                    let _ = self.state.update(|s| s.evolution_mode_enabled = false).await;
                    Some("evolution mode disabled; in-flight tasks will drain".to_string())
                }
                _ => Some("usage: /evolve start|stop".to_string()),
            },
            _ => Some(format!("unknown command: {cmd}")),
        }
    }

    async fn dispatch_message(&mut self, chat_id: i64, text: String) {
        let already_running = self
            .queue
            .get_running_by_chat(chat_id)
            .is_some();
        if already_running {
            // Owner sent a follow-up while a task is in flight: inject it
            // rather than starting a second concurrent task for them.
            if let Some(task_id) = self.queue.get_running_by_chat(chat_id) {
                if let Some(&worker_id) = self.task_to_worker.get(&task_id) {
                    let req = WorkerRequest::InjectMessage { task_id: task_id.to_string(), text };
                    if self.pool.send_injection(worker_id, req).await.is_err() {
                        warn!(worker = worker_id, "failed to inject follow-up message");
                    }
                    let _ = self.state.append_event(
                        "events",
                        serde_json::json!({"kind": "owner_message_injected", "task_id": task_id.to_string()}),
                    ).await;
                    return;
                }
            }
        }

        let mut task = Task::new(TaskId::generate(), "chat", text);
        task.chat_id = Some(chat_id);
        task.created_at_unix = unix_now();
        task.soft_deadline_unix = Some(unix_now() + self.config.soft_timeout_sec);
        task.hard_deadline_unix = Some(unix_now() + self.config.hard_timeout_sec);
        self.queue.enqueue(task);
        self.persist_queue().await;
    }

    async fn drain_events(&mut self) {
        for _ in 0..EVENTS_PER_TICK {
            let Ok((worker_id, resp)) = self.pool.events_rx.try_recv() else {
                break;
            };
            self.pool.apply_response(worker_id, &resp, Instant::now());
            self.apply_event(worker_id, resp).await;
        }
    }

    async fn apply_event(&mut self, worker_id: u32, resp: WorkerResponse) {
        match resp {
            WorkerResponse::Ready | WorkerResponse::Heartbeat { .. } => {}
            WorkerResponse::TaskDone { task_id, final_text, usage_json } => {
                let Ok(id) = task_id.parse::<TaskId>() else {
                    warn!(task_id, "worker reported done for a malformed task id");
                    return;
                };
                self.task_to_worker.remove(&id);
                let _ = self.queue.complete(id, false);
                let _ = self.state.append_event(
                    "events",
                    serde_json::json!({"kind": "task_done", "task_id": task_id}),
                ).await;
                if let Ok(usage) = serde_json::from_value::<ouro_model::Usage>(usage_json) {
                    let _ = self.state.update_budget(&usage, &self.config.models.default.model_id).await;
                }
                if let Some(task) = self.queue.get(id) {
                    if let Some(chat_id) = task.chat_id {
                        let _ = self.chat.send_message(chat_id, &final_text, None).await;
                    }
                }
                self.persist_queue().await;
            }
            WorkerResponse::TaskFailed { task_id, message } => {
                let Ok(id) = task_id.parse::<TaskId>() else {
                    warn!(task_id, "worker reported failure for a malformed task id");
                    return;
                };
                self.task_to_worker.remove(&id);
                let _ = self.queue.complete(id, true);
                let _ = self.state.append_event(
                    "events",
                    serde_json::json!({"kind": "task_done", "task_id": task_id, "failed": true}),
                ).await;
                if let Some(task) = self.queue.get(id) {
                    if let Some(chat_id) = task.chat_id {
                        let _ = self.chat.send_message(chat_id, &format!("task {id} failed: {message}"), None).await;
                    }
                }
                self.persist_queue().await;
            }
            WorkerResponse::Event { task_id, event } => {
                if let Ok(id) = task_id.parse::<TaskId>() {
                    self.task_to_worker.insert(id, worker_id);
                }
                self.apply_worker_event(task_id, event).await;
            }
        }
    }

    async fn apply_worker_event(&mut self, task_id: String, event: WorkerEvent) {
        match event {
            WorkerEvent::RestartRequested { reason } => {
                info!(reason, "restart requested, draining and shutting down");
                self.consciousness.emit(&format!("restart requested: {reason}"));
                self.shutdown_requested = true;
            }
            WorkerEvent::StablePromotionRequested { reason } => {
                self.pending_stable_promotion = Some(reason.clone());
                if let Some(chat_id) = self.state.snapshot().await.owner_chat_id {
                    let _ = self
                        .chat
                        .send_message(chat_id, &format!("promote to stable? ({reason}) reply approve/deny"), None)
                        .await;
                }
            }
            WorkerEvent::TaskScheduled { description, priority, run_after_sec } => {
                let mut task = Task::new(TaskId::generate(), "scheduled", description);
                task.priority = match priority {
                    p if p > 0 => Priority::High,
                    p if p < 0 => Priority::Low,
                    _ => Priority::Normal,
                };
                task.created_at_unix = unix_now() + run_after_sec;
                self.queue.enqueue(task);
                self.persist_queue().await;
            }
            WorkerEvent::TaskCancelled { task_id } => {
                if let Ok(id) = task_id.parse::<TaskId>() {
                    let _ = self.queue.cancel(id);
                    self.persist_queue().await;
                }
            }
            WorkerEvent::ReindexRequested => {
                if let Some(chat_id) = self.state.snapshot().await.owner_chat_id {
                    let _ = self
                        .chat
                        .send_message(chat_id, "reindex requested, reply approve/deny", None)
                        .await;
                }
                let mut task = Task::new(TaskId::generate(), "reindex", "rebuild the codebase index");
                task.priority = Priority::Low;
                self.queue.enqueue(task);
                self.persist_queue().await;
            }
            WorkerEvent::LlmUsage { usage_json, model_id } => {
                if let Ok(usage) = serde_json::from_value::<ouro_model::Usage>(usage_json) {
                    let _ = self.state.update_budget(&usage, &model_id).await;
                }
                let _ = task_id;
            }
        }
    }

    async fn assign_and_enforce(&mut self) {
        let idle = self.pool.idle_worker_ids();
        if !idle.is_empty() {
            let snap = self.state.snapshot().await;
            let remaining = snap.remaining_budget_usd();
            for (worker_id, task) in self.queue.assign_tasks(&idle) {
                self.task_to_worker.insert(task.id, worker_id);
                let req = WorkerRequest::RunTask {
                    task_id: task.id.to_string(),
                    task_type: task.task_type.clone(),
                    text: task.text.clone(),
                    chat_id: task.chat_id,
                    remaining_budget_usd: remaining,
                };
                if self.pool.dispatch(worker_id, task.id.to_string(), req).await.is_err() {
                    warn!(worker = worker_id, task = %task.id, "failed to dispatch task to worker");
                }
            }
            self.persist_queue().await;
        }

        for action in self.queue.enforce_timeouts(unix_now()) {
            match action {
                TimeoutAction::Nudge(id) => {
                    if let Some(&worker_id) = self.task_to_worker.get(&id) {
                        let req = WorkerRequest::InjectMessage {
                            task_id: id.to_string(),
                            text: "NUDGE: you are approaching the soft deadline for this task, wrap up soon.".into(),
                        };
                        let _ = self.pool.send_injection(worker_id, req).await;
                    }
                }
                TimeoutAction::ForceTerminate(id) => {
                    if let Some(worker_id) = self.task_to_worker.remove(&id) {
                        if let Ok((_, carried)) = self.pool.kill_and_replace(worker_id, WORKER_KILL_GRACE).await {
                            let _ = carried;
                        }
                    }
                    if let Some(task) = self.queue.get(id) {
                        if let Some(chat_id) = task.chat_id {
                            let _ = self.chat.send_message(chat_id, &format!("task {id} timed out"), None).await;
                        }
                    }
                }
            }
        }

        let now = Instant::now();
        for worker_id in self.pool.stale_workers(now, WORKER_HEARTBEAT_TIMEOUT) {
            let carried_task = self.task_to_worker.iter().find(|(_, w)| **w == worker_id).map(|(t, _)| *t);
            match self.pool.kill_and_replace(worker_id, WORKER_KILL_GRACE).await {
                Ok((new_worker_id, carried)) => {
                    if let Some(id) = carried_task.or(carried.and_then(|s| s.parse::<TaskId>().ok())) {
                        self.task_to_worker.remove(&id);
                        if !self.requeue_crashed_task(id).await {
                            if let Some(task) = self.queue.get(id) {
                                if let Some(chat_id) = task.chat_id {
                                    let _ = self.chat.send_message(chat_id, &format!("task {id} failed after repeated worker crashes"), None).await;
                                }
                            }
                        }
                    }
                    info!(old_worker = worker_id, new_worker = new_worker_id, "replaced stale worker");
                }
                Err(e) => warn!(worker = worker_id, error = %e, "failed to replace stale worker"),
            }
        }

        self.persist_queue().await;
    }

    /// Re-admits a crashed task under a fresh id with a retry marker in its
    /// text, unless it already carries that marker — a task crashing twice
    /// is marked permanently failed instead (spec.md §4.6). Returns whether
    /// it was requeued.
    async fn requeue_crashed_task(&mut self, id: TaskId) -> bool {
        let Some(task) = self.queue.get(id).cloned() else {
            return false;
        };
        if !matches!(task.status, TaskStatus::Running { .. }) {
            return false;
        }
        let already_retried = task.text.starts_with("[retry_after_worker_crash]");
        let _ = self.queue.complete(id, true);
        if already_retried {
            return false;
        }
        let mut retry = task.clone();
        retry.priority = Priority::High;
        retry.text = format!("[retry_after_worker_crash] {}", retry.text);
        self.queue.enqueue(retry);
        true
    }

    async fn log_heartbeat_if_due(&mut self) {
        if self.last_heartbeat_logged.elapsed() < Duration::from_secs(self.config.heartbeat_sec) {
            return;
        }
        self.last_heartbeat_logged = Instant::now();
        let snap = self.state.snapshot().await;
        info!(
            pending = self.queue.pending_len(),
            running = self.queue.running_len(),
            workers = self.pool.worker_count(),
            offset = snap.tg_offset,
            spent_usd = snap.spent_usd,
            "heartbeat"
        );
    }

    fn evolution_probe_if_due(&mut self) {
        if self.last_evolution_task.elapsed() < EVOLUTION_INTERVAL {
            return;
        }
        self.last_evolution_task = Instant::now();
        let state = self.state.clone();
        tokio::spawn(async move {
            if state.snapshot().await.evolution_mode_enabled {
                info!("evolution mode due for a probe tick");
            }
        });
    }

    async fn persist_queue(&self) {
        let _ = self.queue.save_snapshot(&self.config.queue_dir().join("snapshot.json")).await;
        let _ = save_task_registry(&self.config, &self.queue).await;
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut interrupt = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        tokio::select! {
            _ = term.recv() => {}
            _ = interrupt.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn task_registry_path(config: &AppConfig) -> std::path::PathBuf {
    config.queue_dir().join("tasks.json")
}

/// Persists every non-terminal task's full record (not just its id) so a
/// restart can rebuild a usable `Task`, not just a bare id, from
/// `queue/snapshot.json`.
async fn save_task_registry(config: &AppConfig, queue: &TaskQueue) -> std::io::Result<()> {
    let snapshot = queue.snapshot();
    let mut records = Vec::new();
    for id in snapshot.pending.iter().chain(snapshot.running.iter()) {
        if let Some(task) = queue.get(*id) {
            records.push(task.clone());
        }
    }
    let path = task_registry_path(config);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(&records)?).await?;
    tokio::fs::rename(&tmp, &path).await
}

async fn load_task_registry(config: &AppConfig) -> Vec<Task> {
    match tokio::fs::read(task_registry_path(config)).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

/// Builds the ids already terminal per the event log, per spec.md §8
/// testable property 7 and §4.7's snapshot-restore contract.
async fn already_terminal_ids(config: &AppConfig) -> HashSet<TaskId> {
    let mut terminal = HashSet::new();
    let path = config.logs_dir().join("events.jsonl");
    let Ok(raw) = tokio::fs::read_to_string(&path).await else {
        return terminal;
    };
    for line in raw.lines() {
        let Ok(v) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        if v.get("kind").and_then(|k| k.as_str()) == Some("task_done") {
            if let Some(id) = v.get("task_id").and_then(|t| t.as_str()).and_then(|s| s.parse::<TaskId>().ok()) {
                terminal.insert(id);
            }
        }
    }
    terminal
}

/// Rebuilds a `TaskQueue` at startup from the id-only snapshot plus the
/// supplementary full-record registry, skipping ids the event log already
/// shows as terminal.
async fn restore_queue(config: &AppConfig) -> TaskQueue {
    let snapshot = TaskQueue::load_snapshot(&config.queue_dir().join("snapshot.json")).await;
    let terminal = already_terminal_ids(config).await;
    let to_restore = ouro_queue::restore_non_terminal(&snapshot, &terminal);
    let registry = load_task_registry(config).await;
    let by_id: HashMap<TaskId, Task> = registry.into_iter().map(|t| (t.id, t)).collect();

    let mut queue = TaskQueue::new();
    for id in to_restore {
        if let Some(task) = by_id.get(&id) {
            queue.enqueue_with_id(task.clone());
        } else {
            warn!(task = %id, "snapshot referenced a task with no registry record, dropping");
        }
    }
    queue
}
