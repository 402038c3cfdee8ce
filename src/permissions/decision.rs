//! Outcome of evaluating one tool invocation request.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::modes::PermissionMode;
use super::request::RequestId;
use super::rule::Rule;
use crate::config::{ScopeLevel, SettingsSource};
use crate::mcp::McpServerApprovalStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalOutcome {
    AutoApprove,
    /// Waiting for the operator. Never returned to the agent loop.
    Prompt,
    AutoReject,
    UserApproved,
    UserRejected,
}

impl ApprovalOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::AutoApprove | Self::UserApproved)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::AutoReject | Self::UserRejected)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Prompt)
    }
}

impl fmt::Display for ApprovalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AutoApprove => "auto-approve",
            Self::Prompt => "prompt",
            Self::AutoReject => "auto-reject",
            Self::UserApproved => "user-approved",
            Self::UserRejected => "user-rejected",
        };
        f.write_str(s)
    }
}

/// Why a decision came out the way it did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecisionReason {
    /// Approved by `bypassPermissions` without evaluation.
    Bypass,
    /// Plan mode rejects file operations.
    PlanReadOnly,
    DenyRule { rule: Rule, source: SettingsSource },
    AllowRule { rule: Rule, source: SettingsSource },
    McpServer {
        server: String,
        status: McpServerApprovalStatus,
    },
    /// `acceptEdits` approved a file operation.
    AcceptEdits,
    /// No rule applied; the operator must decide.
    NoMatchingRule,
    /// The operator answered a prompt.
    User { remembered: bool },
    /// The prompt could not be delivered or answered.
    PromptUnavailable,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bypass => write!(f, "{} mode", PermissionMode::BypassPermissions),
            Self::PlanReadOnly => f.write_str("plan mode is read-only"),
            Self::DenyRule { rule, source } => write!(f, "denied by {} rule {}", source, rule),
            Self::AllowRule { rule, source } => write!(f, "allowed by {} rule {}", source, rule),
            Self::McpServer { server, status } => {
                write!(f, "MCP server '{}' is {}", server, status)
            }
            Self::AcceptEdits => write!(f, "{} mode", PermissionMode::AcceptEdits),
            Self::NoMatchingRule => f.write_str("no matching rule"),
            Self::User { remembered: true } => f.write_str("operator decision (remembered)"),
            Self::User { remembered: false } => f.write_str("operator decision"),
            Self::PromptUnavailable => f.write_str("permission prompt unavailable"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalDecision {
    pub outcome: ApprovalOutcome,
    pub reason: DecisionReason,
    /// Scope a new rule was written to, if the operator asked to remember.
    pub persisted_scope: Option<ScopeLevel>,
    /// The request this decision was made for. Execution refuses a decision
    /// stamped for a different request.
    pub request_id: Option<RequestId>,
}

impl ApprovalDecision {
    pub fn new(outcome: ApprovalOutcome, reason: DecisionReason) -> Self {
        Self {
            outcome,
            reason,
            persisted_scope: None,
            request_id: None,
        }
    }

    pub fn auto_approve(reason: DecisionReason) -> Self {
        Self::new(ApprovalOutcome::AutoApprove, reason)
    }

    pub fn auto_reject(reason: DecisionReason) -> Self {
        Self::new(ApprovalOutcome::AutoReject, reason)
    }

    pub fn prompt() -> Self {
        Self::new(ApprovalOutcome::Prompt, DecisionReason::NoMatchingRule)
    }

    pub fn with_persisted_scope(mut self, scope: ScopeLevel) -> Self {
        self.persisted_scope = Some(scope);
        self
    }

    pub fn for_request(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn is_approved(&self) -> bool {
        self.outcome.is_approved()
    }

    pub fn is_rejected(&self) -> bool {
        self.outcome.is_rejected()
    }

    /// Message shown to the model when the call is not permitted.
    pub fn rejection_message(&self, tool_name: &str) -> String {
        format!("Permission to use {} was not granted: {}", tool_name, self.reason)
    }
}
