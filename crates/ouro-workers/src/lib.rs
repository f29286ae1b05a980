// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Worker Pool (C6): N child OS processes speaking a newline-JSON
//! protocol over stdin/stdout, health-monitored and replaced on crash
//! or unresponsiveness.

mod error;
mod handle;
mod pool;
mod protocol;

pub use error::WorkerError;
pub use handle::{WorkerHandle, WorkerState};
pub use pool::WorkerPool;
pub use protocol::{
    decode_request, decode_response, encode_request, encode_response, WorkerEvent, WorkerRequest,
    WorkerResponse,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// A tiny stand-in "worker" binary used only by these tests: it reads
    /// one line, echoes a `Ready`, then for each `run_task` line replies
    /// `TaskDone` immediately. `sh -c` is available in the sandboxed test
    /// environment the workspace's other process-spawning tests rely on.
    fn echo_worker_command() -> (std::path::PathBuf, Vec<String>) {
        let script = r#"printf '{"type":"ready"}\n'; while IFS= read -r line; do printf '{"type":"task_done","task_id":"task0001","final_text":"ok","usage_json":null}\n'; done"#;
        (std::path::PathBuf::from("/bin/sh"), vec!["-c".into(), script.into()])
    }

    #[tokio::test]
    async fn spawn_all_starts_the_requested_worker_count() {
        let (cmd, args) = echo_worker_command();
        let mut pool = WorkerPool::new(cmd, args);
        let spawned = pool.spawn_all(2);
        assert_eq!(spawned.len(), 2);
        assert_eq!(pool.worker_count(), 2);
    }

    #[tokio::test]
    async fn worker_reports_ready_and_becomes_idle() {
        let (cmd, args) = echo_worker_command();
        let mut pool = WorkerPool::new(cmd, args);
        pool.spawn_all(1);

        let (worker_id, resp) = pool.events_rx.recv().await.expect("ready event");
        assert!(matches!(resp, WorkerResponse::Ready));
        pool.apply_response(worker_id, &resp, std::time::Instant::now());
        assert_eq!(pool.idle_worker_ids(), vec![worker_id]);
    }

    #[tokio::test]
    async fn dispatch_then_task_done_frees_the_worker_again() {
        let (cmd, args) = echo_worker_command();
        let mut pool = WorkerPool::new(cmd, args);
        pool.spawn_all(1);
        let (worker_id, ready) = pool.events_rx.recv().await.unwrap();
        pool.apply_response(worker_id, &ready, std::time::Instant::now());

        pool.dispatch(
            worker_id,
            "task0001",
            WorkerRequest::RunTask {
                task_id: "task0001".into(),
                task_type: "chat".into(),
                text: "hi".into(),
                chat_id: None,
                remaining_budget_usd: 10.0,
            },
        )
        .await
        .unwrap();
        assert!(pool.idle_worker_ids().is_empty());

        let (_, done) = pool.events_rx.recv().await.unwrap();
        assert!(matches!(done, WorkerResponse::TaskDone { .. }));
        pool.apply_response(worker_id, &done, std::time::Instant::now());
        assert_eq!(pool.idle_worker_ids(), vec![worker_id]);
    }

    #[tokio::test]
    async fn send_injection_does_not_disturb_a_busy_worker_state() {
        let (cmd, args) = echo_worker_command();
        let mut pool = WorkerPool::new(cmd, args);
        pool.spawn_all(1);
        let (worker_id, ready) = pool.events_rx.recv().await.unwrap();
        pool.apply_response(worker_id, &ready, std::time::Instant::now());

        pool.dispatch(
            worker_id,
            "task0001",
            WorkerRequest::RunTask {
                task_id: "task0001".into(),
                task_type: "chat".into(),
                text: "hi".into(),
                chat_id: None,
                remaining_budget_usd: 10.0,
            },
        )
        .await
        .unwrap();
        assert!(pool.idle_worker_ids().is_empty());

        pool.send_injection(worker_id, WorkerRequest::InjectMessage { task_id: "task0001".into(), text: "nudge".into() })
            .await
            .unwrap();
        assert!(pool.idle_worker_ids().is_empty(), "injection must not change assignment state");

        let (_, done) = pool.events_rx.recv().await.unwrap();
        assert!(matches!(done, WorkerResponse::TaskDone { .. }));
    }

    #[tokio::test]
    async fn send_injection_to_unknown_worker_errors() {
        let (cmd, args) = echo_worker_command();
        let mut pool = WorkerPool::new(cmd, args);
        pool.spawn_all(1);
        let _ = pool.events_rx.recv().await.unwrap();

        let err = pool
            .send_injection(9999, WorkerRequest::InjectMessage { task_id: "task0001".into(), text: "nudge".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::NotFound(9999)));
    }

    #[tokio::test]
    async fn stale_workers_reports_ids_past_the_heartbeat_timeout() {
        let (cmd, args) = echo_worker_command();
        let mut pool = WorkerPool::new(cmd, args);
        pool.spawn_all(1);
        let (worker_id, ready) = pool.events_rx.recv().await.unwrap();
        let old = std::time::Instant::now() - Duration::from_secs(120);
        pool.apply_response(worker_id, &ready, old);

        let stale = pool.stale_workers(std::time::Instant::now(), Duration::from_secs(30));
        assert_eq!(stale, vec![worker_id]);
    }

    #[tokio::test]
    async fn kill_and_replace_preserves_pool_size_and_increments_crash_count() {
        let (cmd, args) = echo_worker_command();
        let mut pool = WorkerPool::new(cmd, args);
        pool.spawn_all(1);
        let (worker_id, ready) = pool.events_rx.recv().await.unwrap();
        pool.apply_response(worker_id, &ready, std::time::Instant::now());

        let (new_id, carried) = pool
            .kill_and_replace(worker_id, Duration::from_millis(10))
            .await
            .unwrap();
        assert_ne!(new_id, worker_id);
        assert_eq!(carried, None);
        assert_eq!(pool.worker_count(), 1);
    }
}
