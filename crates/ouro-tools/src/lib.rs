// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod events;
pub mod registry;
pub mod tool;

pub use events::{EventSink, PendingEvent};
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{Tool, ToolCall, ToolOutput};

pub use builtin::{
    CancelTaskTool, ChatHistoryTool, CodebaseDigestTool, DriveListTool, DriveReadTool,
    DriveWriteTool, GitDiffTool, GitStatusTool, ReindexRequestTool, RepoCommitPushTool,
    RepoListTool, RepoReadTool, RepoWriteCommitTool, RequestRestartTool,
    RequestStablePromotionTool, RunShellTool, ScheduleTaskTool, VisionQueryTool, WebSearchTool,
};
