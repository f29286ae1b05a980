// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Task identity and the pending/running/terminal state machine.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An opaque 8-character token, matching `uuid.uuid4().hex[:8]` in
/// `original_source/supervisor/main.py:263` (spec.md §3 calls the task id
/// an "opaque 8-char token", not a sequence number — a `/cancel` typo
/// should fail lookup, not accidentally address a different real task).
/// Stored as fixed-size bytes rather than a `String` so `TaskId` stays
/// `Copy`, matching the ergonomics callers already rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId([u8; 8]);

#[derive(Debug, thiserror::Error)]
#[error("task id must be an 8-character token")]
pub struct TaskIdParseError;

impl TaskId {
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        hex[..8].parse().expect("uuid hex digits are always a valid token")
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).expect("token bytes are always ascii")
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskId {
    type Err = TaskIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 8 || !s.is_ascii() {
            return Err(TaskIdParseError);
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(s.as_bytes());
        Ok(Self(bytes))
    }
}

impl Serialize for TaskId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// A task's place in the state machine. Every variant other than
/// `Pending`/`Running` is terminal; once terminal a task never
/// transitions again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running { worker_id: u32 },
    Done,
    Failed,
    Cancelled,
    TimedOut,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running { .. })
    }
}

/// Serializable so the supervisor can persist full task records alongside
/// the id-only queue snapshot, letting a restart rebuild usable `Task`
/// values rather than just their ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Caller-supplied key used to dedup re-enqueues of the same logical
    /// request (e.g. a retried chat update).
    pub idempotency_key: Option<String>,
    pub task_type: String,
    pub text: String,
    pub chat_id: Option<i64>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub created_at_unix: u64,
    pub soft_deadline_unix: Option<u64>,
    pub hard_deadline_unix: Option<u64>,
    pub nudged: bool,
}

impl Task {
    pub fn new(id: TaskId, task_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            idempotency_key: None,
            task_type: task_type.into(),
            text: text.into(),
            chat_id: None,
            priority: Priority::default(),
            status: TaskStatus::Pending,
            created_at_unix: 0,
            soft_deadline_unix: None,
            hard_deadline_unix: None,
            nudged: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_eight_ascii_chars_and_distinct() {
        let a = TaskId::generate();
        let b = TaskId::generate();
        assert_eq!(a.as_str().len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn display_and_parse_round_trip() {
        let id: TaskId = "a1b2c3d4".parse().unwrap();
        assert_eq!(id.to_string(), "a1b2c3d4");
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!("short".parse::<TaskId>().is_err());
        assert!("toolongtoken".parse::<TaskId>().is_err());
    }

    #[test]
    fn serializes_as_a_plain_json_string() {
        let id: TaskId = "deadbeef".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"deadbeef\"");
        let back: TaskId = serde_json::from_str("\"deadbeef\"").unwrap();
        assert_eq!(back, id);
    }
}
