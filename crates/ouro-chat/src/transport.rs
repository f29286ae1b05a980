// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The abstract chat transport the rest of the supervisor depends on.
//! Keeping this a trait (rather than calling the Telegram client
//! directly) is what let the teacher's provider-per-adapter split in
//! `ouro-model` carry over to chat: one concrete implementation today,
//! swappable without touching the owner-command dispatch logic.

use async_trait::async_trait;

use crate::types::{ChatError, ChatUpdate};

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Long-polls for updates with `update_id > offset`, waiting up to
    /// `timeout_sec` for at least one to arrive.
    async fn poll_updates(&self, offset: i64, timeout_sec: u64) -> Result<Vec<ChatUpdate>, ChatError>;

    async fn send_message(&self, chat_id: i64, text: &str, parse_mode: Option<&str>) -> Result<(), ChatError>;

    async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<(), ChatError>;

    /// Downloads a previously-referenced file, returning its bytes and
    /// best-effort MIME type.
    async fn download_file(&self, file_id: &str) -> Result<(Vec<u8>, String), ChatError>;
}
