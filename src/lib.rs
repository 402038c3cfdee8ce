//! # tool-gate
//!
//! Permission and execution supervision for agent tool calls.
//!
//! Every tool call an agent wants to make goes through two steps. First a
//! permission decision, taken from layered settings files, the session's
//! permission mode, MCP server approvals, and, when nothing else decides,
//! the operator. Then, if approved, a supervised execution that honours a
//! timeout and can be interrupted at any point.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use tool_gate::{ChannelPrompter, PromptResponse, ScopeConfigStore, ShellRunner, ToolGate,
//!     ToolInvocationRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tool_gate::Error> {
//!     let (prompter, mut prompts) = ChannelPrompter::new(8);
//!     tokio::spawn(async move {
//!         while let Some(pending) = prompts.recv().await {
//!             println!("Allow {}?", pending.request.tool_name);
//!             pending.respond(PromptResponse::approve_once());
//!         }
//!     });
//!
//!     let gate = ToolGate::builder(Arc::new(ScopeConfigStore::for_project("./project")))
//!         .runner("Bash", Arc::new(ShellRunner::new().working_dir("./project")))
//!         .prompter(Arc::new(prompter))
//!         .build()
//!         .await?;
//!
//!     let request = ToolInvocationRequest::from_tool_call("Bash", json!({"command": "cargo fmt"}));
//!     let decision = gate.request_permission(&request).await?;
//!     match gate.run_tool(&request, &decision).await {
//!         Ok(result) => println!("{}", result.output),
//!         Err(e) => eprintln!("{}", e),
//!     }
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::PathBuf;

pub mod config;
pub mod execution;
pub mod gate;
pub mod mcp;
pub mod observability;
pub mod permissions;
pub mod prelude;

// Re-exports for convenience
pub use config::{
    ConfigError, EffectiveConfig, EnvSettings, IntoScope, ScopeConfig, ScopeConfigStore,
    ScopeLevel, ScopePaths, SettingsSource,
};
pub use execution::{
    CancelReason, CancelToken, ExecutionError, ExecutionHandle, ExecutionResult, ExecutionStatus,
    ExecutionSupervisor, HandlerRunner, RunnerRegistry, RunningAction, ShellRunner, ToolHandler,
    ToolRunner,
};
pub use gate::{ToolGate, ToolGateBuilder};
pub use mcp::{McpApprovalRegistry, McpServerApprovalStatus, make_mcp_name, parse_mcp_name};
pub use observability::{GateMetrics, Telemetry, TelemetryEvent, TelemetrySink, TracingSink};
pub use permissions::{
    ApprovalDecision, ApprovalDecisionEngine, ApprovalOutcome, ChannelPrompter, DecisionReason,
    PendingPrompt, PermissionMode, PermissionPrompter, PromptError, PromptRequest, PromptResponse,
    RequestId, Rule, RuleError, ToolInvocationRequest,
};

/// Error type for tool-gate operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Settings could not be read, written, or addressed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A permission rule string could not be parsed.
    #[error("Invalid rule: {0}")]
    Rule(#[from] RuleError),

    /// Tool execution did not produce a result.
    #[error("Tool execution failed: {0}")]
    Execution(#[from] ExecutionError),

    /// The operator could not be asked.
    #[error("Permission prompt failed: {0}")]
    Prompt(#[from] PromptError),

    /// The turn or session was cancelled while waiting for a decision.
    #[error("Aborted: {reason}")]
    Aborted { reason: CancelReason },
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad settings, scope names, or rules
    Configuration,
    /// The call was not approved
    NotPermitted,
    /// Cancelled or timed out
    Interrupted,
    /// IO, spawn, or termination failures
    Internal,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(ConfigError::Io(_)) => ErrorCategory::Internal,
            Error::Config(_) | Error::Rule(_) => ErrorCategory::Configuration,

            Error::Execution(e) if e.is_not_permitted() => ErrorCategory::NotPermitted,
            Error::Execution(e) if e.is_interrupted() => ErrorCategory::Interrupted,
            Error::Aborted { .. } => ErrorCategory::Interrupted,

            Error::Execution(_) | Error::Prompt(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    pub fn is_not_permitted(&self) -> bool {
        self.category() == ErrorCategory::NotPermitted
    }

    /// Only timeouts are worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Execution(e) if e.is_retryable())
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Aborted { .. } => true,
            Error::Execution(e) => e.is_cancelled(),
            _ => false,
        }
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            Error::Aborted { reason } | Error::Execution(ExecutionError::Aborted { reason }) => {
                Some(*reason)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn home_dir() -> Option<PathBuf> {
    directories::UserDirs::new().map(|d| d.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::from(ConfigError::InvalidScope {
            value: "global".into(),
        });
        assert!(err.to_string().contains("global"));
    }

    #[test]
    fn test_error_is_retryable() {
        let timeout = Error::from(ExecutionError::TimedOut { timeout_ms: 100 });
        assert!(timeout.is_retryable());
        assert_eq!(timeout.category(), ErrorCategory::Interrupted);

        let aborted = Error::Aborted {
            reason: CancelReason::UserInterrupt,
        };
        assert!(!aborted.is_retryable());
        assert!(aborted.is_cancelled());
        assert_eq!(aborted.cancel_reason(), Some(CancelReason::UserInterrupt));
    }

    #[test]
    fn test_error_category() {
        let scope = Error::from(ConfigError::InvalidScope {
            value: "global".into(),
        });
        assert!(scope.is_configuration_error());

        let denied = Error::from(ExecutionError::NotPermitted {
            tool: "Bash".into(),
            outcome: ApprovalOutcome::AutoReject,
        });
        assert!(denied.is_not_permitted());

        let io = Error::from(ConfigError::Io(std::io::Error::other("disk")));
        assert_eq!(io.category(), ErrorCategory::Internal);
    }
}
