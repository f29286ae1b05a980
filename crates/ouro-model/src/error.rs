// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Error taxonomy for the LLM Client, realizing spec.md §7's
//! `LLMTransientError`/`LLMPermanentError` split and §9's "represent as a
//! result variant" redesign note: callers never inspect exception types,
//! they call [`ModelError::is_transient`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("provider {0:?} is not configured (missing API key/base URL)")]
    ProviderNotConfigured(String),

    #[error("network error calling {provider}: {source}")]
    Network {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("provider {provider} returned HTTP {status}: {body}")]
    HttpStatus {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {provider}: {detail}")]
    MalformedResponse { provider: String, detail: String },

    #[error("authentication or quota error from {provider}: {detail}")]
    AuthOrQuota { provider: String, detail: String },
}

impl ModelError {
    /// True for network blips, 5xx, and 429 rate-limits — spec.md §7's
    /// `LLMTransientError`, retried up to 3x with exponential backoff by the
    /// Task Loop. False (permanent) errors surface to the owner immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Network { .. } => true,
            ModelError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            ModelError::ProviderNotConfigured(_) => false,
            ModelError::MalformedResponse { .. } => false,
            ModelError::AuthOrQuota { .. } => false,
        }
    }
}
