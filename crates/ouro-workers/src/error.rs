// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker process: {0}")]
    Spawn(std::io::Error),
    #[error("worker stdin closed")]
    StdinClosed,
    #[error("worker {0} not found")]
    NotFound(u32),
    #[error("worker {0} is not idle")]
    NotIdle(u32),
}
