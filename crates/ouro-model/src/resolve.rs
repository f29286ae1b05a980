// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Pure provider-resolution function, grounded on
//! `ouroboros/llm.py::LLMClient._resolve_provider` and narrowed to the
//! provider set spec.md §4.3 names: anthropic, openai, google, zai
//! (`glm-` models), opencode, codex, with a model-agnostic fallback.
//!
//! Resolution never fails: an unrecognised model routes to whatever
//! provider resolution settles on last (the active/fallback provider),
//! per spec.md's explicit "unknown-model safety is a design requirement".

use std::collections::HashMap;

use ouro_config::ProviderConfig;

/// Fixed fallback order consulted when neither an explicit preference nor a
/// model-id prefix match. First configured provider in this order wins.
const FALLBACK_ORDER: &[&str] = &["anthropic", "openai", "google", "zai", "opencode", "openai-codex"];

/// Resolves `model_id` (e.g. `"anthropic/claude-sonnet-4-6"`, bare
/// `"gpt-4.1-mini"`, `"o3-mini"`) against the configured providers.
///
/// `explicit_pref` is the value of `OUROBOROS_LLM_PROVIDER`, consulted first
/// when it names a provider that is actually configured.
///
/// Returns `(provider_name, bare_model_id)` where `bare_model_id` has any
/// recognised provider prefix stripped.
pub fn resolve_provider<'a>(
    model_id: &str,
    providers: &'a HashMap<String, ProviderConfig>,
    explicit_pref: Option<&str>,
) -> (String, String) {
    // 1. Explicit preference, if configured.
    if let Some(pref) = explicit_pref {
        if providers.contains_key(pref) {
            return (pref.to_string(), strip_known_prefix(model_id));
        }
    }

    // 2. Model-id prefix matching.
    if let Some(canonical) = prefix_match(model_id) {
        if providers.contains_key(canonical) {
            return (canonical.to_string(), strip_known_prefix(model_id));
        }
    }

    // 3. Fixed fallback order over whatever is actually configured.
    for candidate in FALLBACK_ORDER {
        if providers.contains_key(*candidate) {
            return (candidate.to_string(), strip_known_prefix(model_id));
        }
    }

    // Nothing configured at all: still return a provider name so the caller
    // produces a clear "provider not configured" error downstream rather
    // than panicking here.
    (
        FALLBACK_ORDER.first().unwrap().to_string(),
        strip_known_prefix(model_id),
    )
}

fn prefix_match(model_id: &str) -> Option<&'static str> {
    let lower = model_id.to_ascii_lowercase();
    if lower.starts_with("anthropic/") {
        return Some("anthropic");
    }
    if lower.starts_with("openai/") {
        return Some("openai");
    }
    if lower.starts_with("google/") {
        return Some("google");
    }
    if lower.starts_with("zai/") || lower.contains("glm-") {
        return Some("zai");
    }
    if lower.starts_with("opencode/") {
        return Some("opencode");
    }
    if lower.starts_with("codex/") {
        return Some("openai-codex");
    }
    if lower.starts_with("o3") || lower.starts_with("o4") || lower.starts_with("gpt-") {
        return Some("openai");
    }
    None
}

/// Strips a `provider/` prefix the wire format doesn't expect. Providers
/// that already speak bare model ids (anthropic, openai, google, openai-codex)
/// never see the prefix; `zai`/`opencode` likewise expect bare ids.
fn strip_known_prefix(model_id: &str) -> String {
    for prefix in ["anthropic/", "openai/", "google/", "zai/", "opencode/", "codex/"] {
        if let Some(rest) = model_id.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    model_id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            api_key: Some("key".to_string()),
            base_url: None,
            requires_reasoning_effort: false,
            supports_prompt_caching: false,
        }
    }

    fn providers(names: &[&str]) -> HashMap<String, ProviderConfig> {
        names.iter().map(|n| (n.to_string(), provider(n))).collect()
    }

    #[test]
    fn explicit_preference_wins_when_configured() {
        let p = providers(&["anthropic", "openai"]);
        let (provider, bare) = resolve_provider("openai/gpt-4.1", &p, Some("anthropic"));
        assert_eq!(provider, "anthropic");
        assert_eq!(bare, "gpt-4.1");
    }

    #[test]
    fn explicit_preference_ignored_when_not_configured() {
        let p = providers(&["openai"]);
        let (provider, _) = resolve_provider("openai/gpt-4.1", &p, Some("anthropic"));
        assert_eq!(provider, "openai");
    }

    #[test]
    fn prefix_match_routes_anthropic() {
        let p = providers(&["anthropic", "openai"]);
        let (provider, bare) = resolve_provider("anthropic/claude-sonnet-4-6", &p, None);
        assert_eq!(provider, "anthropic");
        assert_eq!(bare, "claude-sonnet-4-6");
    }

    #[test]
    fn glm_dash_prefix_routes_zai_even_without_slash() {
        let p = providers(&["zai"]);
        let (provider, _) = resolve_provider("glm-4.6", &p, None);
        assert_eq!(provider, "zai");
    }

    #[test]
    fn o3_and_o4_prefixes_route_openai() {
        let p = providers(&["openai"]);
        assert_eq!(resolve_provider("o3-mini", &p, None).0, "openai");
        assert_eq!(resolve_provider("o4-mini", &p, None).0, "openai");
    }

    #[test]
    fn bare_gpt_prefix_routes_openai() {
        let p = providers(&["openai"]);
        assert_eq!(resolve_provider("gpt-4.1-mini", &p, None).0, "openai");
    }

    #[test]
    fn unknown_model_falls_back_instead_of_failing() {
        let p = providers(&["anthropic"]);
        let (provider, _) = resolve_provider("some-random-local-model", &p, None);
        assert_eq!(provider, "anthropic");
    }

    #[test]
    fn fallback_order_prefers_anthropic_then_openai() {
        let p = providers(&["openai", "google"]);
        let (provider, _) = resolve_provider("unrecognised-model", &p, None);
        assert_eq!(provider, "openai");
    }

    #[test]
    fn codex_prefix_routes_openai_codex() {
        let p = providers(&["openai-codex"]);
        let (provider, bare) = resolve_provider("codex/gpt-5.3-codex", &p, None);
        assert_eq!(provider, "openai-codex");
        assert_eq!(bare, "gpt-5.3-codex");
    }
}
