//! Runs approved actions under a timeout and a cancellation token.

use std::time::Duration;

use tokio::time::Instant;

use super::cancel::{CancelReason, CancelToken};
use super::error::{ExecutionError, ExecutionResult, TerminationTrigger};
use super::runner::{ActionOutcome, RunnerRegistry, RunningAction};
use super::timeout::resolve_timeout;
use crate::config::EnvSettings;
use crate::permissions::{ApprovalDecision, RequestId, ToolInvocationRequest};

/// How long a terminated action gets to exit before we give up on it.
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(2);

/// Starts approved actions and watches them until they settle.
#[derive(Debug, Clone)]
pub struct ExecutionSupervisor {
    runners: RunnerRegistry,
    env: EnvSettings,
    grace: Duration,
}

impl ExecutionSupervisor {
    pub fn new(runners: RunnerRegistry) -> Self {
        Self {
            runners,
            env: EnvSettings::default(),
            grace: DEFAULT_TERMINATION_GRACE,
        }
    }

    pub fn with_env(mut self, env: EnvSettings) -> Self {
        self.env = env;
        self
    }

    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn runners(&self) -> &RunnerRegistry {
        &self.runners
    }

    /// Run `request` to a single terminal state.
    ///
    /// `timeout_ms` overrides the environment and fallback timeouts.
    pub async fn execute(
        &self,
        request: &ToolInvocationRequest,
        decision: &ApprovalDecision,
        timeout_ms: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        self.start(request, decision, timeout_ms, cancel)
            .await?
            .settle()
            .await
    }

    /// Spawn the action and hand back its handle without waiting.
    pub async fn start(
        &self,
        request: &ToolInvocationRequest,
        decision: &ApprovalDecision,
        timeout_ms: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<ExecutionHandle, ExecutionError> {
        if !decision.is_approved() {
            return Err(ExecutionError::NotPermitted {
                tool: request.tool_name().to_string(),
                outcome: decision.outcome,
            });
        }
        if let Some(decided_for) = decision.request_id
            && decided_for != request.id()
        {
            return Err(ExecutionError::DecisionMismatch {
                tool: request.tool_name().to_string(),
                decided_for,
            });
        }

        let runner = self
            .runners
            .resolve(request.tool_name())
            .ok_or_else(|| ExecutionError::UnknownTool {
                tool: request.tool_name().to_string(),
            })?;

        if let Some(reason) = cancel.reason() {
            return Err(ExecutionError::Aborted { reason });
        }

        let timeout = resolve_timeout(timeout_ms, &self.env);
        let action = runner.spawn(request).await?;
        let started = Instant::now();

        Ok(ExecutionHandle {
            request_id: request.id(),
            action,
            cancel: cancel.child_token(),
            timeout,
            deadline: started + timeout,
            started,
            grace: self.grace,
        })
    }
}

/// A running action with its cancellation token and deadline.
///
/// Settling consumes the handle, so each one yields exactly one result.
pub struct ExecutionHandle {
    request_id: RequestId,
    action: Box<dyn RunningAction>,
    cancel: CancelToken,
    timeout: Duration,
    deadline: Instant,
    started: Instant,
    grace: Duration,
}

enum Race {
    Completed(ActionOutcome),
    Cancelled(CancelReason),
    TimedOut,
}

impl ExecutionHandle {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Token scoped to this execution. Cancelling it stops only this action.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Wait for completion, timeout, or cancellation, whichever comes first.
    pub async fn settle(mut self) -> Result<ExecutionResult, ExecutionError> {
        let race = {
            let sleep = tokio::time::sleep_until(self.deadline);
            tokio::pin!(sleep);
            tokio::select! {
                biased;
                outcome = self.action.wait() => Race::Completed(outcome),
                reason = self.cancel.cancelled() => Race::Cancelled(reason),
                _ = &mut sleep => Race::TimedOut,
            }
        };

        match race {
            Race::Completed(outcome) => Ok(ExecutionResult {
                output: outcome.output,
                status: outcome.status,
                duration: self.started.elapsed(),
            }),
            Race::Cancelled(reason) => {
                self.stop(TerminationTrigger::Cancellation).await?;
                Err(ExecutionError::Aborted { reason })
            }
            Race::TimedOut => {
                self.stop(TerminationTrigger::Timeout).await?;
                Err(ExecutionError::TimedOut {
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn stop(&mut self, trigger: TerminationTrigger) -> Result<(), ExecutionError> {
        tracing::debug!(request_id = %self.request_id, trigger = %trigger, "Terminating action");
        self.action.terminate(self.grace).await.map_err(|message| {
            tracing::warn!(
                request_id = %self.request_id,
                trigger = %trigger,
                error = %message,
                "Failed to terminate action"
            );
            ExecutionError::TerminationFailed { trigger, message }
        })
    }
}

impl std::fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("request_id", &self.request_id)
            .field("timeout", &self.timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
