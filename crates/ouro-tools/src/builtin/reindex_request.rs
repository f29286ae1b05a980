// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::events::{EventSink, PendingEvent};
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Raises a request for the codebase digest to be rebuilt.
pub struct ReindexRequestTool {
    pub events: Arc<dyn EventSink>,
}

#[async_trait]
impl Tool for ReindexRequestTool {
    fn name(&self) -> &str {
        "reindex_request"
    }

    fn description(&self) -> &str {
        "Request that the codebase digest be rebuilt."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        self.events.emit(PendingEvent::ReindexRequested);
        ToolOutput::ok(&call.id, "OK: reindex requested")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::RecordingSink;

    #[tokio::test]
    async fn emits_reindex_event() {
        let sink = Arc::new(RecordingSink::default());
        let tool = ReindexRequestTool { events: sink.clone() };
        let call = ToolCall { id: "1".into(), name: "reindex_request".into(), args: json!({}) };
        let out = tool.execute(&call).await;
        assert!(!out.is_error);
        assert_eq!(*sink.events.lock().unwrap(), vec![PendingEvent::ReindexRequested]);
    }
}
