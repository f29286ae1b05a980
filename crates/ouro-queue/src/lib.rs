// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Task Queue (C7): the pending → running → terminal state machine,
//! priority assignment, cancellation, deadline enforcement, and
//! crash-safe snapshot persistence.

mod queue;
mod task;

pub use queue::{restore_non_terminal, QueueError, QueueSnapshot, TaskQueue, TimeoutAction};
pub use task::{Priority, Task, TaskId, TaskStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample_task(kind: &str) -> Task {
        Task::new(TaskId::generate(), kind, format!("do {kind}"))
    }

    #[test]
    fn enqueue_assigns_distinct_opaque_ids() {
        let mut q = TaskQueue::new();
        let a = q.enqueue(sample_task("chat"));
        let b = q.enqueue(sample_task("chat"));
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 8);
        assert_eq!(q.pending_len(), 2);
    }

    #[test]
    fn duplicate_idempotency_key_dedups_to_one_task() {
        let mut q = TaskQueue::new();
        let mut t1 = sample_task("chat");
        t1.idempotency_key = Some("update-42".into());
        let mut t2 = sample_task("chat");
        t2.idempotency_key = Some("update-42".into());

        let a = q.enqueue(t1);
        let b = q.enqueue(t2);
        assert_eq!(a, b);
        assert_eq!(q.pending_len(), 1);
    }

    #[test]
    fn assign_tasks_prefers_higher_priority_then_insertion_order() {
        let mut q = TaskQueue::new();
        let mut low = sample_task("chat");
        low.priority = Priority::Low;
        let mut high = sample_task("code");
        high.priority = Priority::High;
        q.enqueue(low);
        q.enqueue(high);

        let assigned = q.assign_tasks(&[1]);
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].1.task_type, "code");
    }

    #[test]
    fn assign_tasks_preserves_fifo_order_within_same_priority() {
        let mut q = TaskQueue::new();
        let first = q.enqueue(sample_task("a"));
        let second = q.enqueue(sample_task("b"));

        let assigned = q.assign_tasks(&[1, 2]);
        assert_eq!(assigned[0].1.id, first);
        assert_eq!(assigned[1].1.id, second);
    }

    #[test]
    fn cancel_pending_task_moves_it_to_terminal() {
        let mut q = TaskQueue::new();
        let id = q.enqueue(sample_task("chat"));
        q.cancel(id).unwrap();
        assert_eq!(q.pending_len(), 0);
        assert_eq!(q.get(id).unwrap().status, TaskStatus::Cancelled);
    }

    #[test]
    fn cancel_unknown_task_errors_not_found() {
        let mut q = TaskQueue::new();
        let err = q.cancel(TaskId::generate()).unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[test]
    fn cancel_already_terminal_task_is_idempotent() {
        let mut q = TaskQueue::new();
        let id = q.enqueue(sample_task("chat"));
        q.cancel(id).unwrap();
        assert!(q.cancel(id).is_ok());
    }

    #[test]
    fn enqueue_cancel_assign_leaves_task_cancelled_and_unassigned() {
        let mut q = TaskQueue::new();
        let id = q.enqueue(sample_task("chat"));
        q.cancel(id).unwrap();
        let assigned = q.assign_tasks(&[1]);
        assert!(assigned.is_empty());
        assert_eq!(q.get(id).unwrap().status, TaskStatus::Cancelled);
    }

    #[test]
    fn enforce_timeouts_nudges_once_past_soft_deadline() {
        let mut q = TaskQueue::new();
        let mut task = sample_task("chat");
        task.soft_deadline_unix = Some(100);
        task.hard_deadline_unix = Some(1000);
        q.enqueue(task);
        let id = q.assign_tasks(&[1])[0].1.id;

        let first = q.enforce_timeouts(150);
        assert_eq!(first, vec![TimeoutAction::Nudge(id)]);
        let second = q.enforce_timeouts(200);
        assert!(second.is_empty(), "must not nudge twice");
    }

    #[test]
    fn enforce_timeouts_force_terminates_past_hard_deadline() {
        let mut q = TaskQueue::new();
        let mut task = sample_task("chat");
        task.hard_deadline_unix = Some(100);
        q.enqueue(task);
        let id = q.assign_tasks(&[1])[0].1.id;

        let actions = q.enforce_timeouts(150);
        assert_eq!(actions, vec![TimeoutAction::ForceTerminate(id)]);
        assert_eq!(q.running_len(), 0);
        assert_eq!(q.get(id).unwrap().status, TaskStatus::TimedOut);
    }

    #[test]
    fn complete_moves_running_task_to_terminal_done_or_failed() {
        let mut q = TaskQueue::new();
        q.enqueue(sample_task("chat"));
        let id = q.assign_tasks(&[1])[0].1.id;
        q.complete(id, false).unwrap();
        assert_eq!(q.get(id).unwrap().status, TaskStatus::Done);
        assert_eq!(q.running_len(), 0);
    }

    #[test]
    fn enqueue_with_id_preserves_the_given_id_exactly() {
        let mut q = TaskQueue::new();
        let mut task = sample_task("chat");
        let restored_id: TaskId = "restore1".parse().unwrap();
        task.id = restored_id;
        let id = q.enqueue_with_id(task);
        assert_eq!(id, restored_id);
        let fresh = q.enqueue(sample_task("chat"));
        assert_ne!(fresh, restored_id);
    }

    #[test]
    fn get_running_by_chat_finds_the_dispatched_task() {
        let mut q = TaskQueue::new();
        let mut task = sample_task("chat");
        task.chat_id = Some(77);
        q.enqueue(task);
        let assigned = q.assign_tasks(&[1]);
        assert_eq!(q.get_running_by_chat(77), Some(assigned[0].1.id));
        assert_eq!(q.get_running_by_chat(999), None);
    }

    #[test]
    fn restore_non_terminal_skips_ids_already_finished_per_event_log() {
        let one: TaskId = "id000001".parse().unwrap();
        let two: TaskId = "id000002".parse().unwrap();
        let three: TaskId = "id000003".parse().unwrap();
        let snapshot = QueueSnapshot {
            pending: vec![one, two],
            running: vec![three],
        };
        let mut terminal = HashSet::new();
        terminal.insert(two);

        let restored = restore_non_terminal(&snapshot, &terminal);
        assert_eq!(restored, vec![one, three]);
    }

    #[tokio::test]
    async fn save_then_load_snapshot_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue/snapshot.json");
        let mut q = TaskQueue::new();
        q.enqueue(sample_task("chat"));
        q.enqueue(sample_task("code"));
        q.assign_tasks(&[1]);
        q.save_snapshot(&path).await.unwrap();

        let loaded = TaskQueue::load_snapshot(&path).await;
        assert_eq!(loaded.pending.len() + loaded.running.len(), 2);
    }

    #[tokio::test]
    async fn load_snapshot_missing_file_returns_empty_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue/snapshot.json");
        let loaded = TaskQueue::load_snapshot(&path).await;
        assert!(loaded.pending.is_empty() && loaded.running.is_empty());
    }
}
