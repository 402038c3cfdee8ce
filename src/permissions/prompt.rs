//! Operator prompting for requests no rule decides.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::request::RequestId;
use crate::config::ScopeLevel;

/// Payload of the prompt-request event sent to the UI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    pub request_id: RequestId,
    pub tool_name: String,
    pub rule_content: Option<String>,
    /// Scopes the operator may persist a decision to.
    pub scopes: Vec<ScopeLevel>,
}

/// The operator's answer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub approved: bool,
    pub remember: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeLevel>,
}

impl PromptResponse {
    pub fn approve_once() -> Self {
        Self {
            approved: true,
            ..Default::default()
        }
    }

    pub fn approve_and_remember(scope: ScopeLevel) -> Self {
        Self {
            approved: true,
            remember: true,
            scope: Some(scope),
        }
    }

    pub fn reject() -> Self {
        Self::default()
    }

    pub fn reject_and_remember(scope: ScopeLevel) -> Self {
        Self {
            approved: false,
            remember: true,
            scope: Some(scope),
        }
    }

    /// Scope to persist to, if the operator asked to remember.
    pub fn persist_scope(&self) -> Option<ScopeLevel> {
        self.remember.then(|| self.scope.unwrap_or_default())
    }
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("No permission prompt handler is listening")]
    Unavailable,

    #[error("Permission prompt was dropped without an answer")]
    Dropped,

    #[error("Permission prompt failed: {0}")]
    Failed(String),
}

/// UI collaborator that answers permission prompts.
#[async_trait]
pub trait PermissionPrompter: Send + Sync {
    async fn prompt(&self, request: PromptRequest) -> Result<PromptResponse, PromptError>;
}

/// Rejects every prompt. For non-interactive sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyPrompter;

#[async_trait]
impl PermissionPrompter for DenyPrompter {
    async fn prompt(&self, request: PromptRequest) -> Result<PromptResponse, PromptError> {
        tracing::debug!(tool = %request.tool_name, "Non-interactive session, rejecting prompt");
        Ok(PromptResponse::reject())
    }
}

/// A prompt waiting for the operator.
#[derive(Debug)]
pub struct PendingPrompt {
    pub request: PromptRequest,
    reply: oneshot::Sender<PromptResponse>,
}

impl PendingPrompt {
    /// Send the answer. Returns false if the requester has gone away.
    pub fn respond(self, response: PromptResponse) -> bool {
        self.reply.send(response).is_ok()
    }
}

/// Forwards prompts over a channel to a UI task.
///
/// ```rust,no_run
/// use tool_gate::permissions::{ChannelPrompter, PromptResponse};
///
/// # async fn example() {
/// let (prompter, mut prompts) = ChannelPrompter::new(8);
/// tokio::spawn(async move {
///     while let Some(pending) = prompts.recv().await {
///         pending.respond(PromptResponse::approve_once());
///     }
/// });
/// # let _ = prompter;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ChannelPrompter {
    tx: mpsc::Sender<PendingPrompt>,
}

impl ChannelPrompter {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PendingPrompt>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PermissionPrompter for ChannelPrompter {
    async fn prompt(&self, request: PromptRequest) -> Result<PromptResponse, PromptError> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(PendingPrompt { request, reply })
            .await
            .map_err(|_| PromptError::Unavailable)?;
        answer.await.map_err(|_| PromptError::Dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PromptRequest {
        PromptRequest {
            request_id: RequestId::new(),
            tool_name: "Bash".into(),
            rule_content: Some("git status".into()),
            scopes: ScopeLevel::ALL.to_vec(),
        }
    }

    #[test]
    fn test_persist_scope() {
        assert_eq!(PromptResponse::approve_once().persist_scope(), None);
        assert_eq!(
            PromptResponse::approve_and_remember(ScopeLevel::Project).persist_scope(),
            Some(ScopeLevel::Project)
        );

        let no_scope = PromptResponse {
            approved: true,
            remember: true,
            scope: None,
        };
        assert_eq!(no_scope.persist_scope(), Some(ScopeLevel::Local));
    }

    #[test]
    fn test_response_serde() {
        let response: PromptResponse =
            serde_json::from_str(r#"{"approved":true,"remember":true,"scope":"user"}"#).unwrap();
        assert_eq!(response, PromptResponse::approve_and_remember(ScopeLevel::User));

        let err = serde_json::from_str::<PromptResponse>(
            r#"{"approved":true,"remember":true,"scope":"global"}"#,
        );
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_deny_prompter() {
        let response = DenyPrompter.prompt(request()).await.unwrap();
        assert!(!response.approved);
        assert!(!response.remember);
    }

    #[tokio::test]
    async fn test_channel_prompter_round_trip() {
        let (prompter, mut prompts) = ChannelPrompter::new(1);
        let ui = tokio::spawn(async move {
            let pending = prompts.recv().await.unwrap();
            assert_eq!(pending.request.tool_name, "Bash");
            assert!(pending.respond(PromptResponse::approve_once()));
        });

        let response = prompter.prompt(request()).await.unwrap();
        assert!(response.approved);
        ui.await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_prompter_without_listener() {
        let (prompter, prompts) = ChannelPrompter::new(1);
        drop(prompts);
        let err = prompter.prompt(request()).await.unwrap_err();
        assert!(matches!(err, PromptError::Unavailable));
    }

    #[tokio::test]
    async fn test_channel_prompter_dropped_reply() {
        let (prompter, mut prompts) = ChannelPrompter::new(1);
        tokio::spawn(async move {
            let pending = prompts.recv().await.unwrap();
            drop(pending);
        });
        let err = prompter.prompt(request()).await.unwrap_err();
        assert!(matches!(err, PromptError::Dropped));
    }
}
