// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The LLM Client (spec.md §4.3): provider routing, request construction,
//! usage/cost extraction, and the vision-query operation. Retry-on-transient
//! is the Task Loop's responsibility (`ouro-core`); this crate's `chat` call
//! either succeeds or returns a classified [`ModelError`].

mod anthropic;
mod error;
mod google;
mod mock;
mod openai_compat;
mod pricing;
mod provider;
mod registry;
mod resolve;
mod types;

use std::collections::HashMap;
use std::env;
use std::sync::RwLock;

use ouro_config::{AppConfig, ModelProfile};

pub use error::ModelError;
pub use pricing::{compute_cost, rate_for, refresh_pricing, Rate};
pub use provider::ChatModel;
pub use registry::AnyProvider;
pub use types::{ChatRequest, ChatResponse, ContentPart, ImageAttachment, Message, Role, ToolCall, ToolSchema, Usage};

/// Task-intent tag selecting a [`ModelProfile`] (spec.md §4.5 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskIntent {
    Default,
    Light,
    CodeTask,
    Analysis,
    Consciousness,
}

pub fn select_profile(profiles: &ouro_config::ModelProfiles, intent: TaskIntent) -> &ModelProfile {
    match intent {
        TaskIntent::Default => &profiles.default,
        TaskIntent::Light => &profiles.light,
        TaskIntent::CodeTask => &profiles.code_task,
        TaskIntent::Analysis => &profiles.analysis,
        TaskIntent::Consciousness => &profiles.consciousness,
    }
}

/// Entry point used by `ouro-core`. Owns a lazily-built cache of provider
/// adapters keyed by canonical name, so repeated calls within a task don't
/// reconstruct HTTP clients every round.
pub struct LlmClient {
    config: AppConfig,
    built: RwLock<HashMap<String, std::sync::Arc<AnyProvider>>>,
}

impl LlmClient {
    pub fn new(config: AppConfig) -> Self {
        Self { config, built: RwLock::new(HashMap::new()) }
    }

    fn provider_for(&self, canonical_name: &str) -> Result<std::sync::Arc<AnyProvider>, ModelError> {
        if let Some(p) = self.built.read().unwrap().get(canonical_name) {
            return Ok(p.clone());
        }
        let built = registry::build_provider(canonical_name, &self.config.providers)?;
        let arc = std::sync::Arc::new(built);
        self.built.write().unwrap().insert(canonical_name.to_string(), arc.clone());
        Ok(arc)
    }

    /// Resolves `req.model_id`'s provider and issues one chat round.
    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ModelError> {
        let explicit_pref = env::var("OUROBOROS_LLM_PROVIDER").ok();
        let (canonical, bare_model_id) =
            resolve::resolve_provider(&req.model_id, &self.config.providers, explicit_pref.as_deref());
        let provider = self.provider_for(&canonical)?;
        let mut req = req;
        req.model_id = bare_model_id;
        provider.chat(&req).await
    }

    /// Attaches `image` as the final content part of the last user message
    /// and issues the call through the same resolution path as `chat`.
    pub async fn vision_query(&self, mut req: ChatRequest, image: &ImageAttachment) -> Result<ChatResponse, ModelError> {
        let data_url = format!("data:{};base64,{}", image.mime, base64_encode(&image.bytes));
        if let Some(last_user) = req.messages.iter_mut().rev().find(|m| m.role == Role::User) {
            last_user.content.push(ContentPart::image(data_url));
        }
        let explicit_pref = env::var("OUROBOROS_LLM_PROVIDER").ok();
        let (canonical, bare_model_id) =
            resolve::resolve_provider(&req.model_id, &self.config.providers, explicit_pref.as_deref());
        let provider = self.provider_for(&canonical)?;
        req.model_id = bare_model_id;
        provider.vision_query(&req).await
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn profile(id: &str) -> ModelProfile {
        ModelProfile { model_id: id.to_string(), effort: ouro_config::ReasoningEffort::Medium, default_max_tokens: 4096 }
    }

    fn sample_config() -> AppConfig {
        let mut providers = HashMap::new();
        providers.insert(
            "anthropic".to_string(),
            ouro_config::ProviderConfig {
                name: "anthropic".into(),
                api_key: Some("k".into()),
                base_url: None,
                requires_reasoning_effort: true,
                supports_prompt_caching: true,
            },
        );
        AppConfig {
            runtime_dir: "/tmp".into(),
            repo_dir: "/tmp/repo".into(),
            chat_bot_token: "t".into(),
            total_budget_usd: 50.0,
            max_workers: 2,
            soft_timeout_sec: 600,
            hard_timeout_sec: 1800,
            branch_dev: "ouroboros".into(),
            branch_stable: "ouroboros-stable".into(),
            poll_timeout_sec: 15,
            loop_sleep_sec: 0.2,
            heartbeat_sec: 60,
            skip_bootstrap_reset: false,
            disable_auto_rescue: false,
            max_tool_rounds: 200,
            llm_max_retries: 3,
            providers,
            models: ouro_config::ModelProfiles {
                default: profile("anthropic/claude-sonnet-4-6"),
                light: profile("anthropic/claude-sonnet-4-6"),
                code_task: profile("anthropic/claude-sonnet-4-6"),
                analysis: profile("anthropic/claude-sonnet-4-6"),
                consciousness: profile("anthropic/claude-sonnet-4-6"),
            },
            remote_url: None,
        }
    }

    #[test]
    fn select_profile_picks_matching_tag() {
        let profiles = sample_config().models;
        assert_eq!(select_profile(&profiles, TaskIntent::Light).model_id, profiles.light.model_id);
        assert_eq!(select_profile(&profiles, TaskIntent::CodeTask).model_id, profiles.code_task.model_id);
    }

    #[tokio::test]
    async fn provider_for_caches_built_instance() {
        let client = LlmClient::new(sample_config());
        let a = client.provider_for("anthropic").unwrap();
        let b = client.provider_for("anthropic").unwrap();
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn chat_errors_cleanly_on_unconfigured_provider() {
        let client = LlmClient::new(sample_config());
        let req = ChatRequest {
            model_id: "openai/gpt-4.1".into(),
            messages: vec![Message::user("hi")],
            tools: vec![],
            effort: ouro_config::ReasoningEffort::Low,
            max_tokens: 100,
            cache_tools: false,
        };
        let err = client.chat(req).await.unwrap_err();
        assert!(matches!(err, ModelError::ProviderNotConfigured(_)));
    }
}
