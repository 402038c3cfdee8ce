//! Permission system for controlling tool execution.

pub mod decision;
pub mod engine;
pub mod matcher;
pub mod modes;
pub mod prompt;
pub mod request;
pub mod rule;

pub use decision::{ApprovalDecision, ApprovalOutcome, DecisionReason};
pub use engine::ApprovalDecisionEngine;
pub use matcher::{RuleMatcher, RuleMatches};
pub use modes::PermissionMode;
pub use prompt::{
    ChannelPrompter, DenyPrompter, PendingPrompt, PermissionPrompter, PromptError, PromptRequest,
    PromptResponse,
};
pub use request::{RequestId, ToolInvocationRequest, ToolInvocationRequestBuilder};
pub use rule::{MatchKind, Rule, RuleError};

pub const READ_ONLY_TOOLS: &[&str] = &["Read", "Glob", "Grep", "WebSearch", "WebFetch"];
pub const FILE_OPERATION_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];
pub const SHELL_TOOLS: &[&str] = &["Bash", "KillShell"];

pub fn is_read_only_tool(tool_name: &str) -> bool {
    READ_ONLY_TOOLS.contains(&tool_name)
}

/// Tools that mutate files. Plan mode rejects these, `acceptEdits` approves them.
pub fn is_file_operation_tool(tool_name: &str) -> bool {
    FILE_OPERATION_TOOLS.contains(&tool_name)
}

pub fn is_shell_tool(tool_name: &str) -> bool {
    SHELL_TOOLS.contains(&tool_name)
}
