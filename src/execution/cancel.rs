//! Session cancellation with a reason attached.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The operator asked to stop.
    #[default]
    UserInterrupt,
    /// The session is shutting down.
    SessionEnded,
    /// A process signal such as SIGINT.
    Signal,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserInterrupt => f.write_str("interrupted by user"),
            Self::SessionEnded => f.write_str("session ended"),
            Self::Signal => f.write_str("interrupted by signal"),
        }
    }
}

/// Cancellation signal threaded from the session down to running actions.
///
/// Cancelling a token cancels all of its children. A child reports the
/// reason it was cancelled with, falling back to its ancestors' reasons.
#[derive(Clone, Debug)]
pub struct CancelToken {
    token: CancellationToken,
    /// Own reason first, then each ancestor's.
    reasons: Vec<Arc<OnceLock<CancelReason>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reasons: vec![Arc::default()],
        }
    }

    pub fn child_token(&self) -> Self {
        let mut reasons = Vec::with_capacity(self.reasons.len() + 1);
        reasons.push(Arc::default());
        reasons.extend(self.reasons.iter().cloned());
        Self {
            token: self.token.child_token(),
            reasons,
        }
    }

    /// Cancel with `reason`. Only the first reason sticks.
    pub fn cancel(&self, reason: CancelReason) {
        let _ = self.reasons[0].set(reason);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        if !self.is_cancelled() {
            return None;
        }
        Some(
            self.reasons
                .iter()
                .find_map(|r| r.get().copied())
                .unwrap_or_default(),
        )
    }

    /// Resolves once cancelled, with the reason.
    pub async fn cancelled(&self) -> CancelReason {
        self.token.cancelled().await;
        self.reason().unwrap_or_default()
    }

    /// The underlying token, for APIs that take a plain `CancellationToken`.
    pub fn as_cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel with [`CancelReason::Signal`] on Ctrl-C.
    ///
    /// The listener ends when the token is cancelled by other means.
    pub fn cancel_on_ctrl_c(&self) -> JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        tracing::info!("Ctrl-C received, cancelling session");
                        token.cancel(CancelReason::Signal);
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl-C"),
                },
                _ = token.token.cancelled() => {}
            }
        })
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
