//! Terminal states of a supervised execution.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cancel::CancelReason;
use crate::permissions::{ApprovalOutcome, RequestId};

/// What made the supervisor stop an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationTrigger {
    Timeout,
    Cancellation,
}

impl fmt::Display for TerminationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::Cancellation => f.write_str("cancellation"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Tool '{tool}' is not permitted ({outcome})")]
    NotPermitted {
        tool: String,
        outcome: ApprovalOutcome,
    },

    #[error("Decision for request {decided_for} does not cover this call to '{tool}'")]
    DecisionMismatch { tool: String, decided_for: RequestId },

    #[error("No runner registered for tool '{tool}'")]
    UnknownTool { tool: String },

    #[error("Failed to start '{tool}': {message}")]
    SpawnFailed { tool: String, message: String },

    #[error("Execution aborted: {reason}")]
    Aborted { reason: CancelReason },

    #[error("Execution timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    #[error("Failed to terminate action after {trigger}: {message}")]
    TerminationFailed {
        trigger: TerminationTrigger,
        message: String,
    },
}

impl ExecutionError {
    pub fn spawn_failed(tool: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::SpawnFailed {
            tool: tool.into(),
            message: message.to_string(),
        }
    }

    /// Timeouts may be retried; an explicit cancellation must not be.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    pub fn is_not_permitted(&self) -> bool {
        matches!(self, Self::NotPermitted { .. } | Self::DecisionMismatch { .. })
    }

    /// The action was interrupted by the supervisor (timeout or cancel).
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            Self::Aborted { .. } | Self::TimedOut { .. } | Self::TerminationFailed { .. }
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Succeeded,
    /// The action ran to completion but reported failure.
    Failed { exit_code: Option<i32> },
}

impl ExecutionStatus {
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Self::Succeeded,
            other => Self::Failed { exit_code: other },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// An action that ran to completion, successfully or not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    pub output: String,
    pub status: ExecutionStatus,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            ExecutionStatus::Succeeded => Some(0),
            ExecutionStatus::Failed { exit_code } => exit_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ExecutionError::TimedOut { timeout_ms: 100 }.is_retryable());

        let aborted = ExecutionError::Aborted {
            reason: CancelReason::UserInterrupt,
        };
        assert!(!aborted.is_retryable());
        assert!(aborted.is_cancelled());
        assert!(aborted.is_interrupted());

        let denied = ExecutionError::NotPermitted {
            tool: "Bash".into(),
            outcome: ApprovalOutcome::AutoReject,
        };
        assert!(!denied.is_retryable());
        assert!(denied.is_not_permitted());
        assert!(!denied.is_interrupted());
    }

    #[test]
    fn test_status_from_exit_code() {
        assert_eq!(ExecutionStatus::from_exit_code(Some(0)), ExecutionStatus::Succeeded);
        assert_eq!(
            ExecutionStatus::from_exit_code(Some(2)),
            ExecutionStatus::Failed { exit_code: Some(2) }
        );
        assert_eq!(
            ExecutionStatus::from_exit_code(None),
            ExecutionStatus::Failed { exit_code: None }
        );
    }

    #[test]
    fn test_error_display() {
        let err = ExecutionError::TerminationFailed {
            trigger: TerminationTrigger::Timeout,
            message: "process did not exit".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to terminate action after timeout: process did not exit"
        );
        assert_eq!(
            ExecutionError::TimedOut { timeout_ms: 100 }.to_string(),
            "Execution timed out after 100ms"
        );
    }
}
