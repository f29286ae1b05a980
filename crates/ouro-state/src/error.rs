// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("lock already held by a live process (pid {0})")]
    LockHeld(u32),
}
