// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Google Gemini adapter. Routed through the OpenAI-compatible endpoint
//! Google publishes at `/v1beta/openai` — this keeps the wire handling
//! shared with `openai_compat` rather than reimplementing Gemini's native
//! `contents`/`parts` protocol, matching spec.md §4.3's "speaks the
//! OpenAI-compatible chat-completions protocol" baseline.

use crate::error::ModelError;
use crate::openai_compat::{AuthStyle, OpenAiCompatProvider};
use crate::types::{ChatRequest, ChatResponse};

#[derive(Debug)]
pub struct GoogleProvider {
    inner: OpenAiCompatProvider,
}

impl GoogleProvider {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta/openai".to_string());
        Self {
            inner: OpenAiCompatProvider::new("google", base_url, api_key, AuthStyle::Bearer),
        }
    }

    pub async fn chat(&self, model_id: &str, req: &ChatRequest) -> Result<ChatResponse, ModelError> {
        self.inner.chat(model_id, req).await
    }
}
