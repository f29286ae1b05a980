// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Builds a [`ChatModel`] per configured provider, narrowing
//! `sven-model::from_config`'s ~25-provider dispatch down to the set
//! spec.md §4.3 names: anthropic, openai, google, zai, opencode,
//! openai-codex.

use std::collections::HashMap;

use async_trait::async_trait;

use ouro_config::ProviderConfig;

use crate::anthropic::AnthropicProvider;
use crate::error::ModelError;
use crate::google::GoogleProvider;
use crate::mock::MockProvider;
use crate::openai_compat::{AuthStyle, OpenAiCompatProvider};
use crate::provider::ChatModel;
use crate::types::{ChatRequest, ChatResponse};

#[derive(Debug)]
pub enum AnyProvider {
    Anthropic(AnthropicProvider),
    OpenAiCompat(OpenAiCompatProvider),
    Google(GoogleProvider),
    Mock(MockProvider),
}

#[async_trait]
impl ChatModel for AnyProvider {
    fn name(&self) -> &str {
        match self {
            AnyProvider::Anthropic(_) => "anthropic",
            AnyProvider::OpenAiCompat(p) => p.name.as_str(),
            AnyProvider::Google(_) => "google",
            AnyProvider::Mock(_) => "mock",
        }
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ModelError> {
        match self {
            AnyProvider::Anthropic(p) => p.chat(&req.model_id, req).await,
            AnyProvider::OpenAiCompat(p) => p.chat(&req.model_id, req).await,
            AnyProvider::Google(p) => p.chat(&req.model_id, req).await,
            AnyProvider::Mock(p) => p.chat(req).await,
        }
    }
}

/// Builds the one provider instance for `canonical_name`, pulling
/// credentials from `cfg`. Returns `ProviderNotConfigured` when the name
/// isn't present in `cfg` (should not happen if resolution picked it, but
/// kept as a defensive boundary).
pub fn build_provider(canonical_name: &str, cfg: &HashMap<String, ProviderConfig>) -> Result<AnyProvider, ModelError> {
    let provider_cfg = cfg
        .get(canonical_name)
        .ok_or_else(|| ModelError::ProviderNotConfigured(canonical_name.to_string()))?;

    Ok(match canonical_name {
        "anthropic" => AnyProvider::Anthropic(AnthropicProvider::new(
            provider_cfg.api_key.clone(),
            provider_cfg.base_url.clone(),
        )),
        "google" => AnyProvider::Google(GoogleProvider::new(provider_cfg.api_key.clone(), provider_cfg.base_url.clone())),
        "openai" => AnyProvider::OpenAiCompat(OpenAiCompatProvider::new(
            "openai",
            provider_cfg.base_url.clone().unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            provider_cfg.api_key.clone(),
            AuthStyle::Bearer,
        )),
        "zai" => AnyProvider::OpenAiCompat(OpenAiCompatProvider::new(
            "zai",
            provider_cfg.base_url.clone().unwrap_or_else(|| "https://api.z.ai/api/paas/v4".to_string()),
            provider_cfg.api_key.clone(),
            AuthStyle::Bearer,
        )),
        "opencode" => AnyProvider::OpenAiCompat(OpenAiCompatProvider::new(
            "opencode",
            provider_cfg.base_url.clone().unwrap_or_else(|| "https://opencode.ai/api/v1".to_string()),
            provider_cfg.api_key.clone(),
            AuthStyle::Bearer,
        )),
        "openai-codex" => AnyProvider::OpenAiCompat(OpenAiCompatProvider::new(
            "openai-codex",
            provider_cfg.base_url.clone().unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            provider_cfg.api_key.clone(),
            AuthStyle::Bearer,
        )),
        "mock" => AnyProvider::Mock(MockProvider::new(Vec::new())),
        other => return Err(ModelError::ProviderNotConfigured(other.to_string())),
    })
}
