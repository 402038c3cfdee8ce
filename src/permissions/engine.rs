//! The approval state machine.

use std::sync::Arc;

use super::decision::{ApprovalDecision, ApprovalOutcome, DecisionReason};
use super::matcher::RuleMatcher;
use super::modes::PermissionMode;
use super::prompt::PromptResponse;
use super::request::ToolInvocationRequest;
use super::rule::Rule;
use crate::config::{ConfigResult, EffectiveConfig, IntoScope, ScopeConfigStore, ScopeLevel};
use crate::mcp::McpServerApprovalStatus;

/// Decides requests and persists the operator's remembered answers.
#[derive(Debug, Clone)]
pub struct ApprovalDecisionEngine {
    store: Arc<ScopeConfigStore>,
    matcher: RuleMatcher,
}

impl ApprovalDecisionEngine {
    pub fn new(store: Arc<ScopeConfigStore>) -> Self {
        Self {
            store,
            matcher: RuleMatcher::new(),
        }
    }

    pub fn store(&self) -> &Arc<ScopeConfigStore> {
        &self.store
    }

    /// Evaluate one request against a config snapshot.
    ///
    /// Checked in order, first hit wins:
    /// 1. `bypassPermissions` approves.
    /// 2. `plan` rejects file operations.
    /// 3. Any matching deny rule rejects.
    /// 4. An MCP tool follows its server's status unless pending.
    /// 5. `acceptEdits` approves file operations.
    /// 6. Any matching allow rule approves.
    /// 7. Otherwise the operator is asked.
    pub fn decide(
        &self,
        request: &ToolInvocationRequest,
        mode: PermissionMode,
        config: &EffectiveConfig,
    ) -> ApprovalDecision {
        let decision = self.evaluate(request, mode, config).for_request(request.id());
        tracing::debug!(
            tool = %request.tool_name(),
            mode = %mode,
            outcome = %decision.outcome,
            reason = %decision.reason,
            "Permission decision"
        );
        decision
    }

    fn evaluate(
        &self,
        request: &ToolInvocationRequest,
        mode: PermissionMode,
        config: &EffectiveConfig,
    ) -> ApprovalDecision {
        if mode.allows_all() {
            return ApprovalDecision::auto_approve(DecisionReason::Bypass);
        }

        if mode.is_read_only() && request.is_file_operation() {
            return ApprovalDecision::auto_reject(DecisionReason::PlanReadOnly);
        }

        let matches = self.matcher.evaluate(config, request);

        if let Some(deny) = matches.first_deny() {
            return ApprovalDecision::auto_reject(DecisionReason::DenyRule {
                rule: deny.rule.clone(),
                source: deny.source,
            });
        }

        if let Some((server, _)) = request.mcp_target() {
            let status = McpServerApprovalStatus::resolve(server, config);
            let reason = DecisionReason::McpServer {
                server: server.to_string(),
                status,
            };
            match status {
                McpServerApprovalStatus::Rejected => return ApprovalDecision::auto_reject(reason),
                McpServerApprovalStatus::Approved => return ApprovalDecision::auto_approve(reason),
                McpServerApprovalStatus::Pending => {}
            }
        }

        if mode.auto_approves_files() && request.is_file_operation() {
            return ApprovalDecision::auto_approve(DecisionReason::AcceptEdits);
        }

        if let Some(allow) = matches.first_allow() {
            return ApprovalDecision::auto_approve(DecisionReason::AllowRule {
                rule: allow.rule.clone(),
                source: allow.source,
            });
        }

        ApprovalDecision::prompt()
    }

    /// Turn the operator's answer into a terminal decision, persisting a rule
    /// when they asked to remember it.
    pub async fn apply_response(
        &self,
        request: &ToolInvocationRequest,
        response: PromptResponse,
    ) -> ConfigResult<ApprovalDecision> {
        let outcome = if response.approved {
            ApprovalOutcome::UserApproved
        } else {
            ApprovalOutcome::UserRejected
        };

        let persisted = match response.persist_scope() {
            Some(scope) => self.remember(request, response.approved, scope).await?,
            None => None,
        };

        let mut decision = ApprovalDecision::new(
            outcome,
            DecisionReason::User {
                remembered: persisted.is_some(),
            },
        );
        decision.persisted_scope = persisted;
        Ok(decision.for_request(request.id()))
    }

    /// Persist an allow (or deny) rule covering exactly `request`.
    ///
    /// Returns the scope written, or `None` if the request cannot be
    /// expressed as a rule without widening it.
    pub async fn remember(
        &self,
        request: &ToolInvocationRequest,
        allow: bool,
        scope: impl IntoScope,
    ) -> ConfigResult<Option<ScopeLevel>> {
        let scope = scope.into_scope()?;
        let Some(rule) = persistable_rule(request) else {
            tracing::warn!(
                tool = %request.tool_name(),
                "Request content cannot be stored as an exact rule, not remembering"
            );
            return Ok(None);
        };

        let rule = rule.to_string();
        let added = self
            .store
            .update(scope, |c| {
                if allow {
                    c.add_allow_rule(rule.as_str())
                } else {
                    c.add_deny_rule(rule.as_str())
                }
            })
            .await?;
        tracing::debug!(rule = %rule, scope = %scope, allow, added, "Remembered permission rule");
        Ok(Some(scope))
    }
}

/// Content that would read back as a wildcard or prefix rule is refused, as
/// is any rule whose written form does not parse back to itself.
fn persistable_rule(request: &ToolInvocationRequest) -> Option<Rule> {
    match request.rule_content() {
        Some(content) if content.trim() == "*" || content.ends_with(":*") => None,
        Some(content) if content.trim().is_empty() => None,
        _ => {
            let rule = Rule::for_request(request);
            (Rule::parse(&rule.to_string()).ok().as_ref() == Some(&rule)).then_some(rule)
        }
    }
}
