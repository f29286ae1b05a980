// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::events::{EventSink, PendingEvent};
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Raises a request to cancel a queued or running task by id.
pub struct CancelTaskTool {
    pub events: Arc<dyn EventSink>,
}

#[async_trait]
impl Tool for CancelTaskTool {
    fn name(&self) -> &str {
        "cancel_task"
    }

    fn description(&self) -> &str {
        "Cancel a queued or running task by id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "task_id": { "type": "string" } },
            "required": ["task_id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let task_id = match call.args.get("task_id").and_then(Value::as_str) {
            Some(t) => t,
            None => return ToolOutput::err(&call.id, "missing 'task_id'"),
        };
        self.events.emit(PendingEvent::TaskCancelled { task_id: task_id.to_string() });
        ToolOutput::ok(&call.id, format!("OK: cancellation requested for {task_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::RecordingSink;

    #[tokio::test]
    async fn emits_cancel_event() {
        let sink = Arc::new(RecordingSink::default());
        let tool = CancelTaskTool { events: sink.clone() };
        let call = ToolCall { id: "1".into(), name: "cancel_task".into(), args: json!({ "task_id": "t-42" }) };
        let out = tool.execute(&call).await;
        assert!(!out.is_error);
        let events = sink.events.lock().unwrap();
        assert!(matches!(&events[0], PendingEvent::TaskCancelled { task_id } if task_id == "t-42"));
    }
}
