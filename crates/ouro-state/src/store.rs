// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The State Store (C1): atomic persistence of the drive-state snapshot,
//! append-only event/tool/narration logs, and budget accounting.

use std::path::{Path, PathBuf};

use ouro_model::Usage;
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::StateError;
use crate::snapshot::StateSnapshot;

/// Any failure is logged to the `events.jsonl` stream and surfaced to the
/// caller; the in-memory snapshot is left untouched so the next mutation
/// can retry rather than the supervisor crashing mid-task.
pub struct StateStore {
    runtime_dir: PathBuf,
    state: Mutex<StateSnapshot>,
}

impl StateStore {
    fn state_path(runtime_dir: &Path) -> PathBuf {
        runtime_dir.join("state").join("state.json")
    }

    fn log_path(runtime_dir: &Path, stream: &str) -> PathBuf {
        runtime_dir.join("logs").join(format!("{stream}.jsonl"))
    }

    /// Loads the snapshot from `<runtime_dir>/state/state.json`, or
    /// synthesizes a fresh one (new session id, zero spend) if absent.
    pub async fn load(runtime_dir: PathBuf, session_id: String, budget_total_usd: f64) -> Self {
        let path = Self::state_path(&runtime_dir);
        let state = match fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<StateSnapshot>(&raw) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "state.json malformed, starting fresh");
                    StateSnapshot::new(session_id, budget_total_usd)
                }
            },
            Err(_) => StateSnapshot::new(session_id, budget_total_usd),
        };
        Self {
            runtime_dir,
            state: Mutex::new(state),
        }
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        self.state.lock().await.clone()
    }

    /// Atomic write-temp-then-rename-then-fsync, per the persistence
    /// contract that carries over unchanged from the original design.
    pub async fn save(&self) -> Result<(), StateError> {
        let state = self.state.lock().await.clone();
        self.write_snapshot(&state).await
    }

    async fn write_snapshot(&self, state: &StateSnapshot) -> Result<(), StateError> {
        let dir = self.runtime_dir.join("state");
        fs::create_dir_all(&dir).await?;
        let final_path = Self::state_path(&self.runtime_dir);
        let tmp_path = dir.join(format!("state.json.tmp.{}", std::process::id()));

        let body = serde_json::to_vec_pretty(state)?;
        let file = fs::File::create(&tmp_path).await?;
        {
            use tokio::io::AsyncWriteExt;
            let mut file = file;
            file.write_all(&body).await?;
            file.sync_all().await?;
        }
        fs::rename(&tmp_path, &final_path).await?;
        if let Ok(dir_file) = fs::File::open(&dir).await {
            let _ = dir_file.sync_all().await;
        }
        Ok(())
    }

    /// Mutates the in-memory snapshot and persists it in one step.
    pub async fn update<F>(&self, f: F) -> Result<StateSnapshot, StateError>
    where
        F: FnOnce(&mut StateSnapshot),
    {
        let mut guard = self.state.lock().await;
        f(&mut guard);
        let snapshot = guard.clone();
        drop(guard);
        self.write_snapshot(&snapshot).await?;
        Ok(snapshot)
    }

    /// Computes the cost of `usage` and increments `spent_usd`. Prefers the
    /// cost the provider already reported on `usage` (set by the model
    /// layer when the response carried billing data); falls back to the
    /// static pricing table keyed by `model_id` when it didn't.
    pub async fn update_budget(&self, usage: &Usage, model_id: &str) -> Result<f64, StateError> {
        let cost = if usage.cost_usd > 0.0 {
            usage.cost_usd
        } else {
            ouro_model::compute_cost(model_id, usage.prompt_tokens, usage.completion_tokens)
        };
        let snapshot = self
            .update(|s| {
                s.spent_usd += cost;
            })
            .await?;
        Ok(snapshot.spent_usd)
    }

    /// Appends one JSON record as a line to `<runtime_dir>/logs/<stream>.jsonl`.
    /// Never rewrites existing content; rotation is out of scope.
    pub async fn append_event(&self, stream: &str, record: Value) -> Result<(), StateError> {
        let path = Self::log_path(&self.runtime_dir, stream);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        use tokio::io::AsyncWriteExt;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ouro_model::Usage;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().to_path_buf(), "s1".into(), 10.0).await;
        store
            .update(|s| {
                s.owner_id = Some(7);
                s.tg_offset = 3;
            })
            .await
            .unwrap();

        let reloaded = StateStore::load(dir.path().to_path_buf(), "ignored".into(), 10.0).await;
        let snap = reloaded.snapshot().await;
        assert_eq!(snap.owner_id, Some(7));
        assert_eq!(snap.tg_offset, 3);
    }

    #[tokio::test]
    async fn load_missing_file_synthesizes_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().to_path_buf(), "fresh".into(), 25.0).await;
        let snap = store.snapshot().await;
        assert_eq!(snap.session_id, "fresh");
        assert_eq!(snap.spent_usd, 0.0);
    }

    #[tokio::test]
    async fn update_budget_uses_reported_cost_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().to_path_buf(), "s1".into(), 100.0).await;
        let mut usage = Usage::default();
        usage.prompt_tokens = 1000;
        usage.completion_tokens = 500;
        usage.cost_usd = 1.23;
        let spent = store.update_budget(&usage, "gpt-nonexistent").await.unwrap();
        assert_eq!(spent, 1.23);
    }

    #[tokio::test]
    async fn append_event_creates_file_and_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().to_path_buf(), "s1".into(), 10.0).await;
        store
            .append_event("events", serde_json::json!({"kind": "startup"}))
            .await
            .unwrap();
        store
            .append_event("events", serde_json::json!({"kind": "shutdown"}))
            .await
            .unwrap();

        let raw = fs::read_to_string(dir.path().join("logs/events.jsonl"))
            .await
            .unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.lines().next().unwrap().contains("startup"));
    }

    #[tokio::test]
    async fn malformed_state_file_falls_back_to_fresh_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        fs::create_dir_all(&state_dir).await.unwrap();
        fs::write(state_dir.join("state.json"), b"not json")
            .await
            .unwrap();

        let store = StateStore::load(dir.path().to_path_buf(), "recovered".into(), 5.0).await;
        let snap = store.snapshot().await;
        assert_eq!(snap.session_id, "recovered");
    }
}
