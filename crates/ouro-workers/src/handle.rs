// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! A single worker: a child OS process speaking the newline-JSON protocol
//! over stdin/stdout, plus the bookkeeping the pool needs to monitor it.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::WorkerError;
use crate::protocol::{encode_request, WorkerRequest, WorkerResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Spawning,
    Idle,
    Busy,
    /// Asked to shut down; waiting out the grace period before a force-kill.
    Dying,
}

pub struct WorkerHandle {
    pub id: u32,
    pub os_pid: u32,
    pub state: WorkerState,
    pub current_task_id: Option<String>,
    pub start_time: Instant,
    pub last_heartbeat_at: Instant,
    /// Incremented each time this worker slot is respawned after a crash;
    /// a second crash for the same task marks it failed rather than retried.
    pub crash_count: u32,
    child: Child,
    stdin: tokio::process::ChildStdin,
}

impl WorkerHandle {
    /// Spawns `command args...` with stdin/stdout piped, and starts a
    /// background task forwarding each decoded response line to `events`
    /// tagged with this worker's id.
    pub fn spawn(
        id: u32,
        command: &PathBuf,
        args: &[String],
        events: mpsc::UnboundedSender<(u32, WorkerResponse)>,
    ) -> Result<Self, WorkerError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(WorkerError::Spawn)?;

        let os_pid = child.id().unwrap_or(0);
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match crate::protocol::decode_response(&line) {
                        Ok(resp) => {
                            if events.send((id, resp)).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(worker = id, error = %e, "malformed worker response line"),
                    },
                    Ok(None) => {
                        debug!(worker = id, "worker stdout closed");
                        break;
                    }
                    Err(e) => {
                        warn!(worker = id, error = %e, "error reading worker stdout");
                        break;
                    }
                }
            }
        });

        let now = Instant::now();
        Ok(Self {
            id,
            os_pid,
            state: WorkerState::Spawning,
            current_task_id: None,
            start_time: now,
            last_heartbeat_at: now,
            crash_count: 0,
            child,
            stdin,
        })
    }

    pub async fn send(&mut self, req: &WorkerRequest) -> Result<(), WorkerError> {
        let line = encode_request(req);
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|_| WorkerError::StdinClosed)?;
        self.stdin.flush().await.map_err(|_| WorkerError::StdinClosed)
    }

    pub async fn force_kill(&mut self) {
        let _ = self.child.kill().await;
    }

    pub fn mark_heartbeat(&mut self, now: Instant) {
        self.last_heartbeat_at = now;
    }
}
