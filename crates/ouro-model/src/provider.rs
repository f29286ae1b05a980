// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `ChatModel` is the non-streaming request/response contract the Task Loop
//! calls: one round, one response, carrying usage and any tool calls. There
//! is no streaming surface here — spec.md §4.5's Task Loop consumes whole
//! assistant turns, never partial deltas.

use async_trait::async_trait;

use crate::error::ModelError;
use crate::types::{ChatRequest, ChatResponse};

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Canonical provider name (`"anthropic"`, `"openai"`, `"google"`, …).
    fn name(&self) -> &str;

    /// Issues one chat-completion round. The caller owns retry policy
    /// (spec.md §4.3: "the client itself does not retry network errors").
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ModelError>;

    /// A vision-augmented chat call: an image is attached to the final user
    /// turn and routed through the same request path. Default implementation
    /// just forwards to `chat` since image content is already part of
    /// `ChatRequest::messages` — providers that need special handling
    /// (none currently) can override.
    async fn vision_query(&self, req: &ChatRequest) -> Result<ChatResponse, ModelError> {
        self.chat(req).await
    }
}
