// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::events::{EventSink, PendingEvent};
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Raises a request to fast-forward the stable branch to dev's current
/// HEAD. The actual merge still goes through the git mutex in the
/// dispatcher, not here.
pub struct RequestStablePromotionTool {
    pub events: Arc<dyn EventSink>,
}

#[async_trait]
impl Tool for RequestStablePromotionTool {
    fn name(&self) -> &str {
        "request_stable_promotion"
    }

    fn description(&self) -> &str {
        "Request promotion of the current dev branch to stable."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "reason": { "type": "string" } },
            "required": ["reason"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let reason = match call.args.get("reason").and_then(Value::as_str) {
            Some(r) => r,
            None => return ToolOutput::err(&call.id, "missing 'reason'"),
        };
        self.events.emit(PendingEvent::StablePromotionRequested { reason: reason.to_string() });
        ToolOutput::ok(&call.id, "OK: stable promotion requested")
    }
}
