// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Telegram long-poll Bot API implementation of [`ChatTransport`].

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::transport::ChatTransport;
use crate::types::{ChatError, ChatUpdate};

pub struct TelegramTransport {
    bot_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self::with_base_url(bot_token, "https://api.telegram.org".to_string())
    }

    pub fn with_base_url(bot_token: impl Into<String>, base_url: String) -> Self {
        Self {
            bot_token: bot_token.into(),
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url.trim_end_matches('/'), self.bot_token)
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value, ChatError> {
        debug!(method, "calling telegram bot api");
        let resp = self.client.post(self.api_url(method)).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ChatError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| ChatError::MalformedResponse(format!("{e}: {text}")))?;
        if parsed.get("ok").and_then(Value::as_bool) != Some(true) {
            return Err(ChatError::MalformedResponse(format!("telegram returned ok=false: {text}")));
        }
        Ok(parsed["result"].clone())
    }

    fn parse_update(raw: &Value) -> Option<ChatUpdate> {
        let update_id = raw.get("update_id")?.as_i64()?;
        let message = raw.get("message").or_else(|| raw.get("edited_message"))?;
        let from_id = message.get("from")?.get("id")?.as_i64()?;
        let chat_id = message.get("chat")?.get("id")?.as_i64()?;
        let text = message.get("text").and_then(Value::as_str).map(str::to_string);
        let caption = message.get("caption").and_then(Value::as_str).map(str::to_string);
        let photo_file_id = message
            .get("photo")
            .and_then(Value::as_array)
            .and_then(|photos| photos.last())
            .and_then(|p| p.get("file_id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(ChatUpdate {
            update_id,
            from_id,
            chat_id,
            text,
            caption,
            photo_file_id,
        })
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn poll_updates(&self, offset: i64, timeout_sec: u64) -> Result<Vec<ChatUpdate>, ChatError> {
        let result = self
            .call(
                "getUpdates",
                json!({ "offset": offset, "timeout": timeout_sec, "allowed_updates": ["message", "edited_message"] }),
            )
            .await?;
        let items = result
            .as_array()
            .ok_or_else(|| ChatError::MalformedResponse("getUpdates result was not an array".into()))?;
        Ok(items.iter().filter_map(Self::parse_update).collect())
    }

    async fn send_message(&self, chat_id: i64, text: &str, parse_mode: Option<&str>) -> Result<(), ChatError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(mode) = parse_mode {
            body["parse_mode"] = json!(mode);
        }
        self.call("sendMessage", body).await?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<(), ChatError> {
        self.call("sendChatAction", json!({ "chat_id": chat_id, "action": action }))
            .await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<(Vec<u8>, String), ChatError> {
        let result = self.call("getFile", json!({ "file_id": file_id })).await?;
        let file_path = result
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| ChatError::MalformedResponse("getFile response missing file_path".into()))?;

        let url = format!(
            "{}/file/bot{}/{file_path}",
            self.base_url.trim_end_matches('/'),
            self.bot_token
        );
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(ChatError::HttpStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).to_string(),
            });
        }
        Ok((bytes.to_vec(), mime))
    }
}
