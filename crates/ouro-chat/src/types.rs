// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("network error calling chat transport: {0}")]
    Network(#[from] reqwest::Error),
    #[error("chat transport returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("malformed chat transport response: {0}")]
    MalformedResponse(String),
}

/// One inbound update, transport-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatUpdate {
    /// Monotonic id used for the long-poll offset and dedup.
    pub update_id: i64,
    pub from_id: i64,
    pub chat_id: i64,
    pub text: Option<String>,
    pub caption: Option<String>,
    /// Largest available photo's file id, if this update carried an image.
    pub photo_file_id: Option<String>,
}

impl ChatUpdate {
    /// The text to feed the task loop: caption takes precedence when a
    /// photo was sent with one, falling back to a plain text message.
    pub fn message_text(&self) -> Option<&str> {
        self.caption.as_deref().or(self.text.as_deref())
    }
}
