// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Chat transport: the abstract long-poll/send/download surface the
//! supervisor talks to, plus a concrete Telegram Bot API implementation.

mod telegram;
mod transport;
mod types;

pub use telegram::TelegramTransport;
pub use transport::ChatTransport;
pub use types::{ChatError, ChatUpdate};
