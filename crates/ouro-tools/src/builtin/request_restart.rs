// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::events::{EventSink, PendingEvent};
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Raises a restart request for the dispatcher to act on. Never execs
/// directly from a tool call — only the supervisor's main loop performs
/// the actual process replacement.
pub struct RequestRestartTool {
    pub events: Arc<dyn EventSink>,
}

#[async_trait]
impl Tool for RequestRestartTool {
    fn name(&self) -> &str {
        "request_restart"
    }

    fn description(&self) -> &str {
        "Request that the supervisor restart itself (e.g. to pick up a newly committed change)."
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
        self.events.emit(PendingEvent::RestartRequested { reason: reason.to_string() });
        ToolOutput::ok(&call.id, "OK: restart requested")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::RecordingSink;

    #[tokio::test]
    async fn emits_restart_event() {
        let sink = Arc::new(RecordingSink::default());
        let tool = RequestRestartTool { events: sink.clone() };
        let call = ToolCall {
            id: "1".into(),
            name: "request_restart".into(),
            args: json!({ "reason": "picked up new code" }),
        };
        let out = tool.execute(&call).await;
        assert!(!out.is_error);
        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], PendingEvent::RestartRequested { reason } if reason == "picked up new code"));
    }
}
