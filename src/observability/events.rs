//! Fire-and-forget telemetry events.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::ScopeLevel;
use crate::execution::{ExecutionError, ExecutionResult, ExecutionStatus};
use crate::permissions::{ApprovalDecision, ApprovalOutcome, PermissionMode, RequestId};

/// How an execution ended, flattened for reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettledOutcome {
    Succeeded,
    Failed,
    NotPermitted,
    UnknownTool,
    SpawnFailed,
    Aborted,
    TimedOut,
    TerminationFailed,
}

impl SettledOutcome {
    pub fn of(result: &Result<ExecutionResult, ExecutionError>) -> Self {
        match result {
            Ok(r) => match r.status {
                ExecutionStatus::Succeeded => Self::Succeeded,
                ExecutionStatus::Failed { .. } => Self::Failed,
            },
            Err(ExecutionError::NotPermitted { .. } | ExecutionError::DecisionMismatch { .. }) => {
                Self::NotPermitted
            }
            Err(ExecutionError::UnknownTool { .. }) => Self::UnknownTool,
            Err(ExecutionError::SpawnFailed { .. }) => Self::SpawnFailed,
            Err(ExecutionError::Aborted { .. }) => Self::Aborted,
            Err(ExecutionError::TimedOut { .. }) => Self::TimedOut,
            Err(ExecutionError::TerminationFailed { .. }) => Self::TerminationFailed,
        }
    }
}

impl fmt::Display for SettledOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::NotPermitted => "not_permitted",
            Self::UnknownTool => "unknown_tool",
            Self::SpawnFailed => "spawn_failed",
            Self::Aborted => "aborted",
            Self::TimedOut => "timed_out",
            Self::TerminationFailed => "termination_failed",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    DecisionTaken {
        request_id: RequestId,
        tool_name: String,
        mode: PermissionMode,
        outcome: ApprovalOutcome,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        persisted_scope: Option<ScopeLevel>,
        timestamp: DateTime<Utc>,
    },
    /// Audit record for every request approved by `bypassPermissions`.
    BypassApproved {
        request_id: RequestId,
        tool_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        rule_content: Option<String>,
        timestamp: DateTime<Utc>,
    },
    ExecutionSettled {
        request_id: RequestId,
        tool_name: String,
        outcome: SettledOutcome,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl TelemetryEvent {
    pub fn decision(
        request_id: RequestId,
        tool_name: &str,
        mode: PermissionMode,
        decision: &ApprovalDecision,
    ) -> Self {
        Self::DecisionTaken {
            request_id,
            tool_name: tool_name.to_string(),
            mode,
            outcome: decision.outcome,
            reason: decision.reason.to_string(),
            persisted_scope: decision.persisted_scope,
            timestamp: Utc::now(),
        }
    }

    pub fn bypass(request_id: RequestId, tool_name: &str, rule_content: Option<&str>) -> Self {
        Self::BypassApproved {
            request_id,
            tool_name: tool_name.to_string(),
            rule_content: rule_content.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    pub fn settled(
        request_id: RequestId,
        tool_name: &str,
        result: &Result<ExecutionResult, ExecutionError>,
        duration_ms: u64,
    ) -> Self {
        Self::ExecutionSettled {
            request_id,
            tool_name: tool_name.to_string(),
            outcome: SettledOutcome::of(result),
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DecisionTaken { .. } => "decision_taken",
            Self::BypassApproved { .. } => "bypass_approved",
            Self::ExecutionSettled { .. } => "execution_settled",
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Telemetry sink unavailable")]
    Unavailable,

    #[error("Telemetry emit failed: {0}")]
    Failed(String),
}

/// Receives telemetry events. Must not block.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError>;
}

/// Writes every event as a structured `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        match event {
            TelemetryEvent::DecisionTaken {
                request_id,
                tool_name,
                mode,
                outcome,
                reason,
                ..
            } => tracing::info!(
                request_id = %request_id,
                tool = %tool_name,
                mode = %mode,
                outcome = %outcome,
                reason = %reason,
                "Permission decision taken"
            ),
            TelemetryEvent::BypassApproved {
                request_id,
                tool_name,
                rule_content,
                ..
            } => tracing::warn!(
                request_id = %request_id,
                tool = %tool_name,
                content = rule_content.as_deref().unwrap_or(""),
                "Tool call approved by bypassPermissions"
            ),
            TelemetryEvent::ExecutionSettled {
                request_id,
                tool_name,
                outcome,
                duration_ms,
                ..
            } => tracing::info!(
                request_id = %request_id,
                tool = %tool_name,
                outcome = %outcome,
                duration_ms,
                "Tool execution settled"
            ),
        }
        Ok(())
    }
}

/// Fans events out to every registered sink.
///
/// Sink errors are logged at debug level and otherwise ignored.
#[derive(Clone, Default)]
pub struct Telemetry {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn TelemetrySink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn emit(&self, event: TelemetryEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.emit(&event) {
                tracing::debug!(event = event.name(), error = %e, "Telemetry sink failed");
            }
        }
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
