// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! A scripted provider for tests: returns a fixed sequence of responses
//! without any network I/O. Used by `ouro-core`'s Task Loop tests to drive
//! deterministic multi-round scenarios (tool-call round, then a final
//! no-tools round).

use std::sync::Mutex;

use crate::error::ModelError;
use crate::types::{ChatRequest, ChatResponse};

#[derive(Debug)]
pub struct MockProvider {
    responses: Mutex<Vec<ChatResponse>>,
}

impl MockProvider {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self { responses: Mutex::new(responses) }
    }

    pub async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse, ModelError> {
        let mut guard = self.responses.lock().unwrap();
        if guard.is_empty() {
            return Err(ModelError::MalformedResponse {
                provider: "mock".to_string(),
                detail: "no scripted responses remaining".to_string(),
            });
        }
        Ok(guard.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Usage;

    fn resp(text: &str) -> ChatResponse {
        ChatResponse {
            content: text.to_string(),
            tool_calls: vec![],
            usage: Usage::default(),
            generation_id: None,
        }
    }

    #[tokio::test]
    async fn mock_provider_replays_responses_in_order() {
        let m = MockProvider::new(vec![resp("first"), resp("second")]);
        let req = ChatRequest {
            model_id: "mock".into(),
            messages: vec![],
            tools: vec![],
            effort: ouro_config::ReasoningEffort::Low,
            max_tokens: 100,
            cache_tools: false,
        };
        assert_eq!(m.chat(&req).await.unwrap().content, "first");
        assert_eq!(m.chat(&req).await.unwrap().content, "second");
    }

    #[tokio::test]
    async fn mock_provider_errors_when_exhausted() {
        let m = MockProvider::new(vec![]);
        let req = ChatRequest {
            model_id: "mock".into(),
            messages: vec![],
            tools: vec![],
            effort: ouro_config::ReasoningEffort::Low,
            max_tokens: 100,
            cache_tools: false,
        };
        assert!(m.chat(&req).await.is_err());
    }
}
