// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Task Queue (C7): pending/running indices, assignment, cancellation,
//! deadline enforcement, and crash-safe id snapshots.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::task::{Priority, Task, TaskId, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("task not found: {0}")]
    NotFound(TaskId),
}

/// An action `enforce_timeouts` asks the caller to carry out; the queue
/// itself never touches a worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Soft deadline passed: inject a nudge message, task keeps running.
    Nudge(TaskId),
    /// Hard deadline passed: the task is now terminal; the caller must
    /// force-terminate the worker carrying it.
    ForceTerminate(TaskId),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub pending: Vec<TaskId>,
    pub running: Vec<TaskId>,
}

pub struct TaskQueue {
    pending: Vec<Task>,
    running: HashMap<TaskId, Task>,
    terminal: HashMap<TaskId, Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            running: HashMap::new(),
            terminal: HashMap::new(),
        }
    }

    fn find_idempotent_match(&self, key: &str) -> Option<TaskId> {
        self.pending
            .iter()
            .find(|t| t.idempotency_key.as_deref() == Some(key))
            .map(|t| t.id)
            .or_else(|| {
                self.running
                    .values()
                    .find(|t| t.idempotency_key.as_deref() == Some(key))
                    .map(|t| t.id)
            })
            .or_else(|| {
                self.terminal
                    .values()
                    .find(|t| t.idempotency_key.as_deref() == Some(key))
                    .map(|t| t.id)
            })
    }

    /// Enqueues `task`, assigning it a fresh opaque id unless
    /// `idempotency_key` matches an existing task (pending, running, or
    /// terminal), in which case the existing id is returned and nothing new
    /// is created.
    pub fn enqueue(&mut self, mut task: Task) -> TaskId {
        if let Some(key) = task.idempotency_key.clone() {
            if let Some(existing) = self.find_idempotent_match(&key) {
                return existing;
            }
        }
        let id = TaskId::generate();
        task.id = id;
        task.status = TaskStatus::Pending;
        self.pending.push(task);
        id
    }

    /// Re-admits a task recovered from a crash-safe snapshot under its
    /// original id, rather than assigning a fresh one.
    pub fn enqueue_with_id(&mut self, mut task: Task) -> TaskId {
        task.status = TaskStatus::Pending;
        let id = task.id;
        self.pending.push(task);
        id
    }

    /// Pops the highest-priority pending task (ties broken by insertion
    /// order) for each of `idle_worker_ids`, moving it into `running`.
    pub fn assign_tasks(&mut self, idle_worker_ids: &[u32]) -> Vec<(u32, Task)> {
        let mut assigned = Vec::new();
        for &worker_id in idle_worker_ids {
            if self.pending.is_empty() {
                break;
            }
            let best_idx = self
                .pending
                .iter()
                .enumerate()
                .max_by_key(|(idx, t)| (t.priority, std::cmp::Reverse(*idx)))
                .map(|(idx, _)| idx)
                .expect("pending is non-empty");
            let mut task = self.pending.remove(best_idx);
            task.status = TaskStatus::Running { worker_id };
            self.running.insert(task.id, task.clone());
            assigned.push((worker_id, task));
        }
        assigned
    }

    /// Cancels a pending or running task. A task already terminal is a
    /// no-op success (cancellation is idempotent).
    pub fn cancel(&mut self, id: TaskId) -> Result<(), QueueError> {
        if let Some(idx) = self.pending.iter().position(|t| t.id == id) {
            let mut task = self.pending.remove(idx);
            task.status = TaskStatus::Cancelled;
            self.terminal.insert(id, task);
            return Ok(());
        }
        if let Some(mut task) = self.running.remove(&id) {
            task.status = TaskStatus::Cancelled;
            self.terminal.insert(id, task);
            return Ok(());
        }
        if self.terminal.contains_key(&id) {
            return Ok(());
        }
        Err(QueueError::NotFound(id))
    }

    /// Marks a running task `Done`/`Failed` by the caller once the worker
    /// reports completion.
    pub fn complete(&mut self, id: TaskId, failed: bool) -> Result<(), QueueError> {
        let mut task = self.running.remove(&id).ok_or(QueueError::NotFound(id))?;
        task.status = if failed {
            TaskStatus::Failed
        } else {
            TaskStatus::Done
        };
        self.terminal.insert(id, task);
        Ok(())
    }

    /// Checks every running task's deadlines against `now_unix`. Each
    /// task is nudged at most once; hard-deadline expiry is terminal.
    pub fn enforce_timeouts(&mut self, now_unix: u64) -> Vec<TimeoutAction> {
        let mut actions = Vec::new();
        let mut timed_out = Vec::new();
        for task in self.running.values_mut() {
            if let Some(hard) = task.hard_deadline_unix {
                if now_unix >= hard {
                    timed_out.push(task.id);
                    continue;
                }
            }
            if !task.nudged {
                if let Some(soft) = task.soft_deadline_unix {
                    if now_unix >= soft {
                        task.nudged = true;
                        actions.push(TimeoutAction::Nudge(task.id));
                    }
                }
            }
        }
        for id in timed_out {
            if let Some(mut task) = self.running.remove(&id) {
                task.status = TaskStatus::TimedOut;
                self.terminal.insert(id, task);
                actions.push(TimeoutAction::ForceTerminate(id));
            }
        }
        actions
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.pending
            .iter()
            .find(|t| t.id == id)
            .or_else(|| self.running.get(&id))
            .or_else(|| self.terminal.get(&id))
    }

    /// The running task (if any) dispatched on behalf of `chat_id`, used to
    /// route a follow-up owner message as an injection instead of a new task.
    pub fn get_running_by_chat(&self, chat_id: i64) -> Option<TaskId> {
        self.running
            .values()
            .find(|t| t.chat_id == Some(chat_id))
            .map(|t| t.id)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.pending.iter().map(|t| t.id).collect(),
            running: self.running.keys().copied().collect(),
        }
    }

    /// Atomic write-temp-then-rename, matching the state store's
    /// persistence contract.
    pub async fn save_snapshot(&self, path: &Path) -> std::io::Result<()> {
        let snapshot = self.snapshot();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(&snapshot)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub async fn load_snapshot(path: &Path) -> QueueSnapshot {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => QueueSnapshot::default(),
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// The set of non-terminal ids to rehydrate at startup: every id in
/// `snapshot` minus any the event log already recorded as terminal.
pub fn restore_non_terminal(snapshot: &QueueSnapshot, already_terminal: &HashSet<TaskId>) -> Vec<TaskId> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for id in snapshot.pending.iter().chain(snapshot.running.iter()) {
        if already_terminal.contains(id) {
            warn!(task = %id, "skipping restore of task already terminal per event log");
            continue;
        }
        if seen.insert(*id) {
            result.push(*id);
        }
    }
    result
}
