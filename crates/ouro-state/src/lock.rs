// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The singleton supervisor lock: a `{pid, acquired_at}` file at
//! `locks/supervisor_main.lock`. A recorded pid is only treated as live
//! if the process exists, isn't a zombie, and its command line still
//! identifies the supervisor binary; any other condition counts as
//! stale, and acquisition reclaims the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StateError;

const SUPERVISOR_MARKER: &str = "ouroboros";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    pid: u32,
    acquired_at: String,
}

pub struct LockFile {
    path: PathBuf,
    released: bool,
}

impl LockFile {
    /// Attempts to acquire `path`, reclaiming it first if the recorded
    /// owner is stale. Returns [`StateError::LockHeld`] if a live
    /// supervisor process still owns it.
    pub fn acquire(path: &Path, now: &str) -> Result<Self, StateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if let Ok(raw) = std::fs::read_to_string(path) {
            if let Ok(record) = serde_json::from_str::<LockRecord>(&raw) {
                if pid_is_live_supervisor(record.pid) {
                    return Err(StateError::LockHeld(record.pid));
                }
            }
        }

        let record = LockRecord {
            pid: std::process::id(),
            acquired_at: now.to_string(),
        };
        let body = serde_json::to_vec(&record)?;
        std::fs::write(path, body)?;
        Ok(Self {
            path: path.to_path_buf(),
            released: false,
        })
    }

    /// Releases the lock, removing the file. Called explicitly on
    /// graceful shutdown; also runs on drop as a backstop.
    pub fn release(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
            self.released = true;
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        self.release();
    }
}

/// A recorded pid is "live" only if `/proc/<pid>` exists, the process
/// isn't a zombie, and its cmdline contains the supervisor marker.
/// Off Linux, or on any read failure, we can't verify liveness and
/// treat the record as stale rather than risk a permanently wedged lock.
#[cfg(target_os = "linux")]
fn pid_is_live_supervisor(pid: u32) -> bool {
    let proc_dir = format!("/proc/{pid}");
    let status = match std::fs::read_to_string(format!("{proc_dir}/status")) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let is_zombie = status
        .lines()
        .find(|l| l.starts_with("State:"))
        .map(|l| l.contains('Z'))
        .unwrap_or(false);
    if is_zombie {
        return false;
    }
    match std::fs::read(format!("{proc_dir}/cmdline")) {
        Ok(bytes) => {
            let cmdline = String::from_utf8_lossy(&bytes);
            cmdline.contains(SUPERVISOR_MARKER)
        }
        Err(_) => false,
    }
}

#[cfg(not(target_os = "linux"))]
fn pid_is_live_supervisor(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_lock_file_with_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks/supervisor_main.lock");
        let lock = LockFile::acquire(&path, "2026-08-01T00:00:00Z").unwrap();
        let raw = std::fs::read_to_string(&lock.path).unwrap();
        let record: LockRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.pid, std::process::id());
    }

    #[test]
    fn second_acquire_by_the_live_owning_process_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks/supervisor_main.lock");
        let _first = LockFile::acquire(&path, "2026-08-01T00:00:00Z").unwrap();
        let second = LockFile::acquire(&path, "2026-08-01T00:00:01Z");
        assert!(matches!(second, Err(StateError::LockHeld(_))));
    }

    #[test]
    fn stale_pid_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks/supervisor_main.lock");
        let record = LockRecord {
            pid: 999_999,
            acquired_at: "2020-01-01T00:00:00Z".into(),
        };
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_vec(&record).unwrap()).unwrap();

        let acquired = LockFile::acquire(&path, "2026-08-01T00:00:00Z");
        assert!(acquired.is_ok());
    }

    #[test]
    fn release_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks/supervisor_main.lock");
        let mut lock = LockFile::acquire(&path, "2026-08-01T00:00:00Z").unwrap();
        lock.release();
        assert!(!path.exists());
    }
}
