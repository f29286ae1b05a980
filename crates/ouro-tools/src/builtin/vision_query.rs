// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use ouro_model::{ChatRequest, ImageAttachment, LlmClient, Message};
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Asks the vision-capable model profile a question about an image read
/// from the drive root. Not in the read-only parallel-safe whitelist —
/// it issues a billed LLM call, so it runs serially like every other
/// non-repo tool.
pub struct VisionQueryTool {
    pub model: Arc<LlmClient>,
    pub drive_root: std::path::PathBuf,
    pub model_id: String,
}

#[async_trait]
impl Tool for VisionQueryTool {
    fn name(&self) -> &str {
        "vision_query"
    }

    fn description(&self) -> &str {
        "Ask a question about an image stored under the drive root."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "image_path": { "type": "string" },
                "question": { "type": "string" }
            },
            "required": ["image_path", "question"],
            "additionalProperties": false
        })
    }

    fn timeout_sec(&self) -> u64 {
        60
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let image_path = match call.args.get("image_path").and_then(Value::as_str) {
            Some(p) => p,
            None => return ToolOutput::err(&call.id, "missing 'image_path'"),
        };
        let question = match call.args.get("question").and_then(Value::as_str) {
            Some(q) => q,
            None => return ToolOutput::err(&call.id, "missing 'question'"),
        };

        let target = match crate::builtin::fsutil::safe_join(&self.drive_root, image_path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let bytes = match tokio::fs::read(&target).await {
            Ok(b) => b,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };
        let mime = mime_for(&target);

        let req = ChatRequest {
            model_id: self.model_id.clone(),
            messages: vec![Message::user(question)],
            tools: vec![],
            effort: ouro_config::ReasoningEffort::Medium,
            max_tokens: 1024,
            cache_tools: false,
        };
        let attachment = ImageAttachment { bytes, mime, caption: None };

        match self.model.vision_query(req, &attachment).await {
            Ok(resp) => ToolOutput::ok(&call.id, resp.content),
            Err(e) => ToolOutput::err(&call.id, format!("vision_query error: {e}")),
        }
    }
}

fn mime_for(path: &std::path::Path) -> String {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_for_detects_common_extensions() {
        assert_eq!(mime_for(std::path::Path::new("a.png")), "image/png");
        assert_eq!(mime_for(std::path::Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_for(std::path::Path::new("a.unknown")), "image/jpeg");
    }

    #[tokio::test]
    async fn missing_image_path_is_an_error() {
        let tool = VisionQueryTool {
            model: Arc::new(LlmClient::new(ouro_config::AppConfig {
                runtime_dir: "/tmp".into(),
                repo_dir: "/tmp".into(),
                chat_bot_token: "t".into(),
                total_budget_usd: 1.0,
                max_workers: 1,
                soft_timeout_sec: 1,
                hard_timeout_sec: 1,
                branch_dev: "d".into(),
                branch_stable: "s".into(),
                poll_timeout_sec: 1,
                loop_sleep_sec: 0.1,
                heartbeat_sec: 1,
                skip_bootstrap_reset: true,
                disable_auto_rescue: true,
                max_tool_rounds: 1,
                llm_max_retries: 1,
                providers: Default::default(),
                models: ouro_config::ModelProfiles {
                    default: ouro_config::ModelProfile {
                        model_id: "mock/m".into(),
                        effort: ouro_config::ReasoningEffort::Low,
                        default_max_tokens: 100,
                    },
                    light: ouro_config::ModelProfile {
                        model_id: "mock/m".into(),
                        effort: ouro_config::ReasoningEffort::Low,
                        default_max_tokens: 100,
                    },
                    code_task: ouro_config::ModelProfile {
                        model_id: "mock/m".into(),
                        effort: ouro_config::ReasoningEffort::Low,
                        default_max_tokens: 100,
                    },
                    analysis: ouro_config::ModelProfile {
                        model_id: "mock/m".into(),
                        effort: ouro_config::ReasoningEffort::Low,
                        default_max_tokens: 100,
                    },
                    consciousness: ouro_config::ModelProfile {
                        model_id: "mock/m".into(),
                        effort: ouro_config::ReasoningEffort::Low,
                        default_max_tokens: 100,
                    },
                },
                remote_url: None,
            })),
            drive_root: "/tmp".into(),
            model_id: "mock/m".into(),
        };
        let call = ToolCall { id: "1".into(), name: "vision_query".into(), args: json!({}) };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }
}
