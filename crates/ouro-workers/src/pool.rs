// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Worker Pool (C6): spawns and monitors N child worker processes,
//! dispatches tasks to idle ones, and replaces workers that crash or go
//! unresponsive.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::WorkerError;
use crate::handle::{WorkerHandle, WorkerState};
use crate::protocol::{WorkerRequest, WorkerResponse};

pub struct WorkerPool {
    command: PathBuf,
    args: Vec<String>,
    workers: Vec<WorkerHandle>,
    next_id: u32,
    events_tx: mpsc::UnboundedSender<(u32, WorkerResponse)>,
    pub events_rx: mpsc::UnboundedReceiver<(u32, WorkerResponse)>,
}

impl WorkerPool {
    pub fn new(command: PathBuf, args: Vec<String>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            command,
            args,
            workers: Vec::new(),
            next_id: 1,
            events_tx,
            events_rx,
        }
    }

    /// Spawns `count` workers. Returns the ids actually spawned; a spawn
    /// failure for one worker doesn't stop the rest from starting.
    pub fn spawn_all(&mut self, count: u32) -> Vec<u32> {
        let mut spawned = Vec::new();
        for _ in 0..count {
            match self.spawn_one() {
                Ok(id) => spawned.push(id),
                Err(e) => warn!(error = %e, "failed to spawn worker"),
            }
        }
        spawned
    }

    fn spawn_one(&mut self) -> Result<u32, WorkerError> {
        let id = self.next_id;
        self.next_id += 1;
        let handle = WorkerHandle::spawn(id, &self.command, &self.args, self.events_tx.clone())?;
        info!(worker = id, pid = handle.os_pid, "worker spawned");
        self.workers.push(handle);
        Ok(id)
    }

    fn find_mut(&mut self, id: u32) -> Option<&mut WorkerHandle> {
        self.workers.iter_mut().find(|w| w.id == id)
    }

    pub fn idle_worker_ids(&self) -> Vec<u32> {
        self.workers
            .iter()
            .filter(|w| matches!(w.state, WorkerState::Idle))
            .map(|w| w.id)
            .collect()
    }

    /// Marks the worker busy and sends it a task to run.
    pub async fn dispatch(
        &mut self,
        worker_id: u32,
        task_id: impl Into<String>,
        req: WorkerRequest,
    ) -> Result<(), WorkerError> {
        let w = self.find_mut(worker_id).ok_or(WorkerError::NotFound(worker_id))?;
        if !matches!(w.state, WorkerState::Idle | WorkerState::Spawning) {
            return Err(WorkerError::NotIdle(worker_id));
        }
        w.send(&req).await?;
        w.state = WorkerState::Busy;
        w.current_task_id = Some(task_id.into());
        Ok(())
    }

    /// Sends a line to an already-busy worker without touching its
    /// assignment state: used for `InjectMessage` follow-ups and deadline
    /// nudges, neither of which start a new assignment.
    pub async fn send_injection(&mut self, worker_id: u32, req: WorkerRequest) -> Result<(), WorkerError> {
        let w = self.find_mut(worker_id).ok_or(WorkerError::NotFound(worker_id))?;
        w.send(&req).await
    }

    /// Applies an inbound [`WorkerResponse`] to pool state: `Ready`/`Heartbeat`
    /// move a worker to idle and refresh its liveness clock; `TaskDone`/
    /// `TaskFailed` free it back up.
    pub fn apply_response(&mut self, worker_id: u32, resp: &WorkerResponse, now: Instant) {
        let Some(w) = self.find_mut(worker_id) else {
            return;
        };
        w.mark_heartbeat(now);
        match resp {
            WorkerResponse::Ready => {
                w.state = WorkerState::Idle;
            }
            WorkerResponse::Heartbeat { .. } | WorkerResponse::Event { .. } => {}
            WorkerResponse::TaskDone { .. } | WorkerResponse::TaskFailed { .. } => {
                w.state = WorkerState::Idle;
                w.current_task_id = None;
            }
        }
    }

    /// Workers whose last heartbeat is older than `timeout` — candidates
    /// for `kill_and_replace`.
    pub fn stale_workers(&self, now: Instant, timeout: Duration) -> Vec<u32> {
        self.workers
            .iter()
            .filter(|w| now.duration_since(w.last_heartbeat_at) > timeout)
            .map(|w| w.id)
            .collect()
    }

    /// Stop signal, then a grace period, then force-terminate; the dead
    /// slot is removed and a fresh worker takes its place. Returns the
    /// new worker's id along with the task (if any) the dead one was
    /// carrying, so the caller can re-queue it once.
    pub async fn kill_and_replace(
        &mut self,
        worker_id: u32,
        grace: Duration,
    ) -> Result<(u32, Option<String>), WorkerError> {
        let (carried_task, prior_crash_count) = {
            let w = self.find_mut(worker_id).ok_or(WorkerError::NotFound(worker_id))?;
            w.state = WorkerState::Dying;
            let _ = w.send(&WorkerRequest::Shutdown).await;
            (w.current_task_id.clone(), w.crash_count)
        };

        tokio::time::sleep(grace).await;

        if let Some(w) = self.find_mut(worker_id) {
            w.force_kill().await;
        }
        self.workers.retain(|w| w.id != worker_id);

        let new_id = self.spawn_one()?;
        if let Some(new_handle) = self.find_mut(new_id) {
            new_handle.crash_count = prior_crash_count + 1;
        }
        warn!(old_worker = worker_id, new_worker = new_id, "replaced worker");
        Ok((new_id, carried_task))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn shutdown_all(&mut self, grace: Duration) {
        for w in &mut self.workers {
            let _ = w.send(&WorkerRequest::Shutdown).await;
        }
        tokio::time::sleep(grace).await;
        for w in &mut self.workers {
            w.force_kill().await;
        }
        self.workers.clear();
    }
}
