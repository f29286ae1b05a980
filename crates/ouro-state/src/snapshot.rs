// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The persisted drive-state snapshot (`state/state.json`).

use serde::{Deserialize, Serialize};

/// The full persisted state of a running supervisor. This is the value
/// `StateStore::load`/`save` round-trip to disk; every field here is
/// named directly by the runtime state layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Chat-platform user id of the owner, set on the first authenticated
    /// message this supervisor ever receives.
    pub owner_id: Option<i64>,
    /// Chat id the owner was last seen in; outbound notifications target this.
    pub owner_chat_id: Option<i64>,
    pub budget_total_usd: f64,
    pub spent_usd: f64,
    /// Last consumed chat long-poll offset, so restart doesn't redeliver updates.
    pub tg_offset: i64,
    /// Snapshot schema version, bumped on breaking layout changes.
    pub version: u32,
    pub session_id: String,
    pub evolution_mode_enabled: bool,
    /// RFC3339 timestamp of the last message the owner sent, if any.
    pub last_owner_message_at: Option<String>,
}

impl StateSnapshot {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(session_id: String, budget_total_usd: f64) -> Self {
        Self {
            owner_id: None,
            owner_chat_id: None,
            budget_total_usd,
            spent_usd: 0.0,
            tg_offset: 0,
            version: Self::CURRENT_VERSION,
            session_id,
            evolution_mode_enabled: true,
            last_owner_message_at: None,
        }
    }

    pub fn remaining_budget_usd(&self) -> f64 {
        (self.budget_total_usd - self.spent_usd).max(0.0)
    }

    pub fn budget_ratio_spent(&self) -> f64 {
        if self.budget_total_usd <= 0.0 {
            return 1.0;
        }
        (self.spent_usd / self.budget_total_usd).clamp(0.0, 1.0)
    }
}
