// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The conversation buffer owned by one Task Loop invocation (spec.md §3's
//! `ConversationBuffer`). Enforces the strict pairing invariant: every
//! `assistant` message with non-empty `tool_calls` is immediately followed
//! by one `tool` message per call, in the order the calls were emitted.

use ouro_model::{ChatResponse, Message, Role, ToolCall};

#[derive(Debug, Clone, Default)]
pub struct ConversationBuffer {
    messages: Vec<Message>,
}

impl ConversationBuffer {
    pub fn new() -> Self {
        Self { messages: Vec::new() }
    }

    pub fn push_system(&mut self, text: impl Into<String>) {
        self.messages.push(Message::system(text));
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Appends the assistant's turn. If it carries tool calls, the caller
    /// must follow with exactly that many `push_tool_result` calls, in the
    /// same order, before calling the LLM again.
    pub fn push_assistant(&mut self, response: &ChatResponse) {
        self.messages.push(Message {
            role: Role::Assistant,
            content: vec![ouro_model::ContentPart::text(response.content.clone())],
            tool_calls: response.tool_calls.clone(),
            tool_call_id: None,
        });
    }

    pub fn push_tool_result(&mut self, tool_call_id: impl Into<String>, content: impl Into<String>) {
        self.messages.push(Message::tool_result(tool_call_id, content));
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Walks the buffer checking the invariant named in spec.md §3: every
    /// tool-calling assistant message is immediately followed by one tool
    /// message per call, in call order. Returns the first violation found.
    pub fn check_pairing_invariant(&self) -> Result<(), String> {
        let mut i = 0;
        while i < self.messages.len() {
            let msg = &self.messages[i];
            if msg.role == Role::Assistant && !msg.tool_calls.is_empty() {
                for (offset, call) in msg.tool_calls.iter().enumerate() {
                    let idx = i + 1 + offset;
                    match self.messages.get(idx) {
                        Some(m) if m.role == Role::Tool && m.tool_call_id.as_deref() == Some(call.id.as_str()) => {}
                        Some(m) if m.role == Role::Tool => {
                            return Err(format!(
                                "tool result at index {idx} answers {:?}, expected {}",
                                m.tool_call_id, call.id
                            ))
                        }
                        _ => return Err(format!("missing tool result for call {} at index {idx}", call.id)),
                    }
                }
                i += 1 + msg.tool_calls.len();
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    /// True once the most recent assistant message carries no tool calls —
    /// the Task Loop's sole termination condition (spec.md §3).
    pub fn is_terminal(&self) -> bool {
        matches!(self.messages.last(), Some(m) if m.role == Role::Assistant && m.tool_calls.is_empty())
    }

    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        match self.messages.last() {
            Some(m) if m.role == Role::Assistant => &m.tool_calls,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ouro_model::Usage;

    fn response_with_calls(calls: Vec<ToolCall>) -> ChatResponse {
        ChatResponse { content: String::new(), tool_calls: calls, usage: Usage::default(), generation_id: None }
    }

    #[test]
    fn well_paired_buffer_passes_invariant_check() {
        let mut buf = ConversationBuffer::new();
        buf.push_user("go");
        buf.push_assistant(&response_with_calls(vec![ToolCall {
            id: "c1".into(),
            name: "repo_read".into(),
            arguments_json: "{}".into(),
        }]));
        buf.push_tool_result("c1", "ok");
        assert!(buf.check_pairing_invariant().is_ok());
    }

    #[test]
    fn missing_tool_result_fails_invariant_check() {
        let mut buf = ConversationBuffer::new();
        buf.push_assistant(&response_with_calls(vec![ToolCall {
            id: "c1".into(),
            name: "repo_read".into(),
            arguments_json: "{}".into(),
        }]));
        assert!(buf.check_pairing_invariant().is_err());
    }

    #[test]
    fn terminal_only_when_last_assistant_message_has_no_tool_calls() {
        let mut buf = ConversationBuffer::new();
        buf.push_user("go");
        assert!(!buf.is_terminal());
        buf.push_assistant(&response_with_calls(vec![]));
        assert!(buf.is_terminal());
    }

    #[test]
    fn pending_tool_calls_reflects_last_assistant_message() {
        let mut buf = ConversationBuffer::new();
        let calls = vec![ToolCall { id: "c1".into(), name: "repo_read".into(), arguments_json: "{}".into() }];
        buf.push_assistant(&response_with_calls(calls.clone()));
        assert_eq!(buf.pending_tool_calls().len(), 1);
        assert_eq!(buf.pending_tool_calls()[0].id, "c1");
    }
}
