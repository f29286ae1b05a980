// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Entrypoint for the `ouroboros` binary: a single executable running in
//! one of two modes (spec.md §4.6, §4.10).
//!
//! With no arguments it is the Supervisor Main: the singleton-locked
//! process that owns the chat transport, task queue, worker pool, and git
//! coordinator. With `--worker` as the first argument it is a worker
//! process, spawned by the supervisor's [`ouro_workers::WorkerPool`],
//! reading task requests from stdin and writing results to stdout.

mod supervisor;
mod worker;

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_worker = std::env::args().nth(1).as_deref() == Some("--worker");
    init_logging(is_worker)?;

    if is_worker {
        worker::run().await
    } else {
        supervisor::run().await
    }
}

/// Workers and the supervisor share a runtime directory but must not
/// interleave stdout with the worker protocol, so tracing always goes to
/// stderr plus a JSON-lines file under `logs/`; nothing is ever written to
/// stdout outside the worker wire format.
fn init_logging(is_worker: bool) -> anyhow::Result<()> {
    let config = ouro_config::load()?;
    std::fs::create_dir_all(config.logs_dir())?;
    let log_name = if is_worker { "worker.jsonl" } else { "supervisor.jsonl" };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.logs_dir().join(log_name))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(false).with_writer(std::io::stderr))
        .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
        .with(filter)
        .try_init();

    Ok(())
}
