//! How approved actions are started and stopped.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::error::{ExecutionError, ExecutionStatus};
use crate::mcp;
use crate::permissions::ToolInvocationRequest;

/// Output of an action that finished on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionOutcome {
    pub output: String,
    pub status: ExecutionStatus,
}

impl ActionOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            status: ExecutionStatus::Succeeded,
        }
    }

    pub fn failure(output: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            output: output.into(),
            status: ExecutionStatus::Failed { exit_code },
        }
    }
}

/// Starts the action behind a tool.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn spawn(
        &self,
        request: &ToolInvocationRequest,
    ) -> Result<Box<dyn RunningAction>, ExecutionError>;
}

/// A started action.
#[async_trait]
pub trait RunningAction: Send {
    /// Wait for the action to finish on its own.
    ///
    /// Must be cancel-safe: the supervisor drops this future when a timeout
    /// or cancellation wins the race and then calls [`terminate`].
    ///
    /// [`terminate`]: RunningAction::terminate
    async fn wait(&mut self) -> ActionOutcome;

    /// Forcibly stop the action and wait up to `grace` for it to exit.
    async fn terminate(&mut self, grace: Duration) -> Result<(), String>;
}

/// Maps tool names to runners.
///
/// Lookup is by exact name first, then by MCP server wildcard
/// (`mcp__<server>__*`).
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    runners: HashMap<String, Arc<dyn ToolRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool_name: impl Into<String>, runner: Arc<dyn ToolRunner>) {
        self.runners.insert(tool_name.into(), runner);
    }

    pub fn with_runner(mut self, tool_name: impl Into<String>, runner: Arc<dyn ToolRunner>) -> Self {
        self.register(tool_name, runner);
        self
    }

    /// Route every tool of an MCP server to one runner.
    pub fn register_mcp_server(&mut self, server: &str, runner: Arc<dyn ToolRunner>) {
        self.register(mcp::server_wildcard(server), runner);
    }

    pub fn resolve(&self, tool_name: &str) -> Option<Arc<dyn ToolRunner>> {
        if let Some(runner) = self.runners.get(tool_name) {
            return Some(Arc::clone(runner));
        }
        let (server, _) = mcp::parse_mcp_name(tool_name)?;
        self.runners.get(&mcp::server_wildcard(server)).cloned()
    }

    pub fn contains(&self, tool_name: &str) -> bool {
        self.resolve(tool_name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.runners.keys().map(String::as_str)
    }
}

impl fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("RunnerRegistry").field("runners", &names).finish()
    }
}
