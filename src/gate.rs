//! The agent loop's entry point: decide, then run.

use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::config::{EnvSettings, ScopeConfigStore, ScopeLevel};
use crate::execution::{
    CancelReason, CancelToken, ExecutionError, ExecutionResult, ExecutionSupervisor,
    RunnerRegistry, ToolRunner,
};
use crate::mcp::McpApprovalRegistry;
use crate::observability::{Telemetry, TelemetryEvent, TelemetrySink};
use crate::permissions::{
    ApprovalDecision, ApprovalDecisionEngine, ApprovalOutcome, DecisionReason, DenyPrompter,
    PermissionMode, PermissionPrompter, PromptRequest, ToolInvocationRequest,
};
use crate::{Error, Result};

/// Permission gate and execution supervisor for one agent session.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use tool_gate::{ToolGate, ShellRunner, ScopeConfigStore, ToolInvocationRequest};
///
/// # async fn example() -> tool_gate::Result<()> {
/// let gate = ToolGate::builder(Arc::new(ScopeConfigStore::for_project(".")))
///     .runner("Bash", Arc::new(ShellRunner::new()))
///     .build()
///     .await?;
///
/// let request = ToolInvocationRequest::from_tool_call("Bash", json!({"command": "git status"}));
/// let decision = gate.request_permission(&request).await?;
/// if decision.is_approved() {
///     let result = gate.run_tool(&request, &decision).await?;
///     println!("{}", result.output);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ToolGate {
    store: Arc<ScopeConfigStore>,
    engine: ApprovalDecisionEngine,
    supervisor: ExecutionSupervisor,
    prompter: Arc<dyn PermissionPrompter>,
    telemetry: Telemetry,
    env: EnvSettings,
    mode: RwLock<PermissionMode>,
    /// Serializes decisions so they resolve in issue order.
    order: Mutex<()>,
    session: CancelToken,
    turn: StdMutex<CancelToken>,
}

impl ToolGate {
    pub fn builder(store: Arc<ScopeConfigStore>) -> ToolGateBuilder {
        ToolGateBuilder::new(store)
    }

    pub fn mode(&self) -> PermissionMode {
        *self.mode.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Explicit mode change from the operator.
    ///
    /// The force-bypass environment flag and a policy that disables bypass
    /// still apply, so the resulting mode may differ from `raw`.
    pub async fn set_mode(&self, raw: &str) -> Result<PermissionMode> {
        let config = self.store.merge().await?;
        let mode = PermissionMode::for_session(Some(raw), &self.env, &config);
        *self.mode.write().unwrap_or_else(PoisonError::into_inner) = mode;
        tracing::info!(mode = %mode, "Permission mode changed");
        Ok(mode)
    }

    pub fn store(&self) -> &Arc<ScopeConfigStore> {
        &self.store
    }

    pub fn engine(&self) -> &ApprovalDecisionEngine {
        &self.engine
    }

    /// Approval state for `.mcp.json` servers, backed by the same settings.
    pub fn mcp_registry(&self) -> McpApprovalRegistry {
        McpApprovalRegistry::new(Arc::clone(&self.store))
    }

    pub fn session_token(&self) -> &CancelToken {
        &self.session
    }

    /// Token for the current turn. Replaced after every [`interrupt`].
    ///
    /// [`interrupt`]: ToolGate::interrupt
    pub fn turn_token(&self) -> CancelToken {
        self.turn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop whatever is in flight for this turn. The session stays usable.
    pub fn interrupt(&self) {
        let mut turn = self.turn.lock().unwrap_or_else(PoisonError::into_inner);
        turn.cancel(CancelReason::UserInterrupt);
        *turn = self.session.child_token();
        tracing::info!("Turn interrupted");
    }

    /// Cancel everything for good.
    pub fn end_session(&self) {
        self.session.cancel(CancelReason::SessionEnded);
    }

    /// Decide whether `request` may run, asking the operator if needed.
    ///
    /// Settings are re-read for every call, and the decision is made
    /// against that snapshot.
    #[instrument(skip(self, request), fields(tool = %request.tool_name(), request_id = %request.id()))]
    pub async fn request_permission(
        &self,
        request: &ToolInvocationRequest,
    ) -> Result<ApprovalDecision> {
        let cancel = self.turn_token();
        let _turn = tokio::select! {
            biased;
            reason = cancel.cancelled() => return Err(Error::Aborted { reason }),
            guard = self.order.lock() => guard,
        };

        let config = self.store.merge().await?;
        let mode = self.mode();
        let mut decision = self.engine.decide(request, mode, &config);

        if decision.reason == DecisionReason::Bypass {
            self.telemetry.emit(TelemetryEvent::bypass(
                request.id(),
                request.tool_name(),
                request.rule_content(),
            ));
        }

        if decision.outcome == ApprovalOutcome::Prompt {
            decision = self.ask(request, &cancel).await?;
        }

        self.telemetry.emit(TelemetryEvent::decision(
            request.id(),
            request.tool_name(),
            mode,
            &decision,
        ));
        Ok(decision)
    }

    async fn ask(
        &self,
        request: &ToolInvocationRequest,
        cancel: &CancelToken,
    ) -> Result<ApprovalDecision> {
        let prompt = PromptRequest {
            request_id: request.id(),
            tool_name: request.tool_name().to_string(),
            rule_content: request.rule_content().map(str::to_string),
            scopes: self.writable_scopes(),
        };

        let answer = tokio::select! {
            biased;
            reason = cancel.cancelled() => return Err(Error::Aborted { reason }),
            answer = self.prompter.prompt(prompt) => answer,
        };

        match answer {
            Ok(response) => Ok(self.engine.apply_response(request, response).await?),
            Err(e) => {
                tracing::warn!(error = %e, "Permission prompt failed, rejecting");
                Ok(ApprovalDecision::auto_reject(DecisionReason::PromptUnavailable)
                    .for_request(request.id()))
            }
        }
    }

    fn writable_scopes(&self) -> Vec<ScopeLevel> {
        ScopeLevel::ALL
            .into_iter()
            .filter(|scope| self.store.paths().get(*scope).is_some())
            .collect()
    }

    /// Run an approved request. A numeric `timeout` input field overrides
    /// the configured timeout.
    pub async fn run_tool(
        &self,
        request: &ToolInvocationRequest,
        decision: &ApprovalDecision,
    ) -> std::result::Result<ExecutionResult, ExecutionError> {
        let timeout_ms = request.input().get("timeout").and_then(Value::as_u64);
        self.run_tool_with_timeout(request, decision, timeout_ms).await
    }

    #[instrument(skip(self, request, decision), fields(tool = %request.tool_name(), request_id = %request.id()))]
    pub async fn run_tool_with_timeout(
        &self,
        request: &ToolInvocationRequest,
        decision: &ApprovalDecision,
        timeout_ms: Option<u64>,
    ) -> std::result::Result<ExecutionResult, ExecutionError> {
        let started = Instant::now();
        let result = self
            .supervisor
            .execute(request, decision, timeout_ms, &self.turn_token())
            .await;

        if let Err(e) = &result {
            tracing::debug!(error = %e, "Tool execution did not complete");
        }
        self.telemetry.emit(TelemetryEvent::settled(
            request.id(),
            request.tool_name(),
            &result,
            started.elapsed().as_millis() as u64,
        ));
        result
    }
}

impl std::fmt::Debug for ToolGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGate")
            .field("mode", &self.mode())
            .field("supervisor", &self.supervisor)
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

pub struct ToolGateBuilder {
    store: Arc<ScopeConfigStore>,
    runners: RunnerRegistry,
    prompter: Arc<dyn PermissionPrompter>,
    telemetry: Telemetry,
    env: Option<EnvSettings>,
    mode: Option<String>,
    session: Option<CancelToken>,
    grace: Option<std::time::Duration>,
}

impl ToolGateBuilder {
    fn new(store: Arc<ScopeConfigStore>) -> Self {
        Self {
            store,
            runners: RunnerRegistry::new(),
            prompter: Arc::new(DenyPrompter),
            telemetry: Telemetry::new(),
            env: None,
            mode: None,
            session: None,
            grace: None,
        }
    }

    pub fn runner(mut self, tool_name: impl Into<String>, runner: Arc<dyn ToolRunner>) -> Self {
        self.runners.register(tool_name, runner);
        self
    }

    pub fn mcp_server_runner(mut self, server: &str, runner: Arc<dyn ToolRunner>) -> Self {
        self.runners.register_mcp_server(server, runner);
        self
    }

    pub fn runners(mut self, runners: RunnerRegistry) -> Self {
        self.runners = runners;
        self
    }

    /// Defaults to [`DenyPrompter`].
    pub fn prompter(mut self, prompter: Arc<dyn PermissionPrompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn telemetry_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry.add_sink(sink);
        self
    }

    /// Defaults to [`EnvSettings::from_env`].
    pub fn env(mut self, env: EnvSettings) -> Self {
        self.env = Some(env);
        self
    }

    /// Explicit session mode, e.g. from a CLI flag.
    pub fn mode(mut self, raw: impl Into<String>) -> Self {
        self.mode = Some(raw.into());
        self
    }

    pub fn session_token(mut self, token: CancelToken) -> Self {
        self.session = Some(token);
        self
    }

    pub fn termination_grace(mut self, grace: std::time::Duration) -> Self {
        self.grace = Some(grace);
        self
    }

    pub async fn build(self) -> Result<ToolGate> {
        let env = self.env.unwrap_or_else(EnvSettings::from_env);
        let config = self.store.merge().await?;
        let mode = PermissionMode::for_session(self.mode.as_deref(), &env, &config);
        if config.malformed_rules > 0 {
            tracing::warn!(count = config.malformed_rules, "Skipped malformed permission rules");
        }

        let mut supervisor = ExecutionSupervisor::new(self.runners).with_env(env.clone());
        if let Some(grace) = self.grace {
            supervisor = supervisor.with_termination_grace(grace);
        }

        let session = self.session.unwrap_or_default();
        let turn = session.child_token();
        tracing::debug!(mode = %mode, "Tool gate ready");

        Ok(ToolGate {
            engine: ApprovalDecisionEngine::new(Arc::clone(&self.store)),
            store: self.store,
            supervisor,
            prompter: self.prompter,
            telemetry: self.telemetry,
            env,
            mode: RwLock::new(mode),
            order: Mutex::new(()),
            session,
            turn: StdMutex::new(turn),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopePaths;
    use crate::execution::HandlerRunner;
    use crate::permissions::{ChannelPrompter, PromptResponse};
    use serde_json::json;
    use tempfile::{TempDir, tempdir};

    fn store(dir: &TempDir) -> Arc<ScopeConfigStore> {
        Arc::new(ScopeConfigStore::new(ScopePaths::new(
            None,
            dir.path().join("project.json"),
            dir.path().join("local.json"),
        )))
    }

    fn echo() -> Arc<dyn ToolRunner> {
        Arc::new(HandlerRunner::from_fn(|input: Value| async move {
            Ok(input["text"].as_str().unwrap_or_default().to_string())
        }))
    }

    #[tokio::test]
    async fn test_prompt_scopes_skip_missing_paths() {
        let dir = tempdir().unwrap();
        let gate = ToolGate::builder(store(&dir))
            .env(EnvSettings::default())
            .build()
            .await
            .unwrap();
        assert_eq!(
            gate.writable_scopes(),
            vec![ScopeLevel::Project, ScopeLevel::Local]
        );
    }

    #[tokio::test]
    async fn test_default_prompter_rejects() {
        let dir = tempdir().unwrap();
        let gate = ToolGate::builder(store(&dir))
            .env(EnvSettings::default())
            .build()
            .await
            .unwrap();
        let request = ToolInvocationRequest::builder("Echo").build();
        let decision = gate.request_permission(&request).await.unwrap();
        assert_eq!(decision.outcome, ApprovalOutcome::UserRejected);
    }

    #[tokio::test]
    async fn test_closed_prompt_channel_fails_closed() {
        let dir = tempdir().unwrap();
        let (prompter, prompts) = ChannelPrompter::new(1);
        drop(prompts);
        let gate = ToolGate::builder(store(&dir))
            .env(EnvSettings::default())
            .prompter(Arc::new(prompter))
            .build()
            .await
            .unwrap();

        let request = ToolInvocationRequest::builder("Echo").build();
        let decision = gate.request_permission(&request).await.unwrap();
        assert_eq!(decision.outcome, ApprovalOutcome::AutoReject);
        assert_eq!(decision.reason, DecisionReason::PromptUnavailable);
    }

    #[tokio::test]
    async fn test_interrupt_aborts_pending_prompt() {
        let dir = tempdir().unwrap();
        let (prompter, mut prompts) = ChannelPrompter::new(1);
        let gate = Arc::new(
            ToolGate::builder(store(&dir))
                .env(EnvSettings::default())
                .prompter(Arc::new(prompter))
                .build()
                .await
                .unwrap(),
        );

        let waiting = Arc::clone(&gate);
        let task = tokio::spawn(async move {
            let request = ToolInvocationRequest::builder("Echo").build();
            waiting.request_permission(&request).await
        });

        let pending = prompts.recv().await.unwrap();
        gate.interrupt();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::Aborted {
                reason: CancelReason::UserInterrupt
            }
        ));
        assert!(!pending.respond(PromptResponse::approve_once()));

        // The next turn works again.
        assert!(!gate.turn_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_set_mode_respects_policy() {
        let dir = tempdir().unwrap();
        let policy = dir.path().join("policy.json");
        std::fs::write(&policy, r#"{"disableBypassPermissionsMode": "disable"}"#).unwrap();
        let store = Arc::new(
            ScopeConfigStore::new(ScopePaths::new(
                None,
                dir.path().join("project.json"),
                dir.path().join("local.json"),
            ))
            .with_policy_file(&policy),
        );
        let gate = ToolGate::builder(store)
            .env(EnvSettings::default())
            .build()
            .await
            .unwrap();

        assert_eq!(gate.set_mode("plan").await.unwrap(), PermissionMode::Plan);
        assert_eq!(
            gate.set_mode("bypassPermissions").await.unwrap(),
            PermissionMode::Default
        );
        assert_eq!(gate.mode(), PermissionMode::Default);
    }

    #[tokio::test]
    async fn test_run_tool_uses_input_timeout() {
        let dir = tempdir().unwrap();
        let slow: Arc<dyn ToolRunner> = Arc::new(HandlerRunner::from_fn(|_| async {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(String::new())
        }));
        let gate = ToolGate::builder(store(&dir))
            .env(EnvSettings::default())
            .mode("bypassPermissions")
            .runner("Slow", slow)
            .runner("Echo", echo())
            .build()
            .await
            .unwrap();

        let request = ToolInvocationRequest::builder("Slow")
            .input(json!({"timeout": 20}))
            .build();
        let decision = gate.request_permission(&request).await.unwrap();
        let err = gate.run_tool(&request, &decision).await.unwrap_err();
        assert!(matches!(err, ExecutionError::TimedOut { timeout_ms: 20 }));

        let request = ToolInvocationRequest::builder("Echo")
            .input(json!({"text": "hi"}))
            .build();
        let decision = gate.request_permission(&request).await.unwrap();
        assert_eq!(gate.run_tool(&request, &decision).await.unwrap().output, "hi");
    }
}
