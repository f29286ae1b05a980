// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::events::{EventSink, PendingEvent};
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Raises a request to enqueue a new task, optionally delayed.
pub struct ScheduleTaskTool {
    pub events: Arc<dyn EventSink>,
}

#[async_trait]
impl Tool for ScheduleTaskTool {
    fn name(&self) -> &str {
        "schedule_task"
    }

    fn description(&self) -> &str {
        "Schedule a new task to run, optionally after a delay."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": { "type": "string" },
                "priority": { "type": "integer" },
                "run_after_sec": { "type": "integer" }
            },
            "required": ["description"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let description = match call.args.get("description").and_then(Value::as_str) {
            Some(d) => d,
            None => return ToolOutput::err(&call.id, "missing 'description'"),
        };
        let priority = call.args.get("priority").and_then(Value::as_i64).unwrap_or(0) as i32;
        let run_after_sec = call.args.get("run_after_sec").and_then(Value::as_u64).unwrap_or(0);

        self.events.emit(PendingEvent::TaskScheduled {
            description: description.to_string(),
            priority,
            run_after_sec,
        });
        ToolOutput::ok(&call.id, format!("OK: scheduled task '{description}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::RecordingSink;

    #[tokio::test]
    async fn emits_schedule_event_with_defaults() {
        let sink = Arc::new(RecordingSink::default());
        let tool = ScheduleTaskTool { events: sink.clone() };
        let call = ToolCall {
            id: "1".into(),
            name: "schedule_task".into(),
            args: json!({ "description": "run the nightly digest" }),
        };
        let out = tool.execute(&call).await;
        assert!(!out.is_error);
        let events = sink.events.lock().unwrap();
        assert!(matches!(
            &events[0],
            PendingEvent::TaskScheduled { priority: 0, run_after_sec: 0, .. }
        ));
    }
}
