// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Static per-model pricing, grounded on `ouroboros/llm.py::MODEL_PRICING`.
//! spec.md §4.1 requires a static pricing table keyed by model id and
//! explicitly permits — but never requires — a live refresh; `refresh_pricing`
//! exists for that optional path and is never called automatically.

use std::collections::HashMap;
use std::sync::RwLock;

/// Dollars per million prompt/completion tokens.
#[derive(Debug, Clone, Copy)]
pub struct Rate {
    pub prompt_per_million: f64,
    pub completion_per_million: f64,
}

fn default_table() -> HashMap<&'static str, Rate> {
    let mut m = HashMap::new();
    m.insert(
        "anthropic/claude-sonnet-4-6",
        Rate { prompt_per_million: 3.0, completion_per_million: 15.0 },
    );
    m.insert(
        "anthropic/claude-opus-4-6",
        Rate { prompt_per_million: 15.0, completion_per_million: 75.0 },
    );
    m.insert(
        "openai/gpt-4.2",
        Rate { prompt_per_million: 2.5, completion_per_million: 10.0 },
    );
    m.insert(
        "google/gemini-2.5-pro-preview",
        Rate { prompt_per_million: 1.25, completion_per_million: 5.0 },
    );
    m.insert(
        "openai/gpt-4.1-mini",
        Rate { prompt_per_million: 0.15, completion_per_million: 0.6 },
    );
    m.insert(
        "openai/gpt-4.1-turbo",
        Rate { prompt_per_million: 0.5, completion_per_million: 2.0 },
    );
    m
}

/// Process-wide pricing table, swappable via [`refresh_pricing`].
static TABLE: RwLock<Option<HashMap<String, Rate>>> = RwLock::new(None);

fn with_table<T>(f: impl FnOnce(&HashMap<&'static str, Rate>) -> T) -> T
where
    T: Clone,
{
    // The static table never changes shape after first use; `refresh_pricing`
    // overlays onto a separate owned map instead of mutating this one.
    let base = default_table();
    f(&base)
}

/// Looks up the rate for `model_id`, falling back to any live-refreshed
/// override first.
pub fn rate_for(model_id: &str) -> Option<Rate> {
    if let Ok(guard) = TABLE.read() {
        if let Some(overrides) = guard.as_ref() {
            if let Some(r) = overrides.get(model_id) {
                return Some(*r);
            }
        }
    }
    with_table(|t| t.get(model_id).copied())
}

/// Computes cost in USD from token counts. Unknown models price to zero —
/// per spec.md's Open Question on pricing freshness, "stale cost estimates
/// must not cause correctness bugs, only accounting drift", so an unknown
/// model degrades to free rather than failing the round.
pub fn compute_cost(model_id: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    match rate_for(model_id) {
        Some(r) => {
            (prompt_tokens as f64 / 1_000_000.0) * r.prompt_per_million
                + (completion_tokens as f64 / 1_000_000.0) * r.completion_per_million
        }
        None => 0.0,
    }
}

/// Installs a refreshed pricing overlay (e.g. from a provider's model-catalog
/// endpoint). Never invoked automatically; callable from the supervisor's
/// heartbeat maintenance hook per SPEC_FULL.md §B.5.
pub fn refresh_pricing(overrides: HashMap<String, Rate>) {
    if let Ok(mut guard) = TABLE.write() {
        *guard = Some(overrides);
    }
}
