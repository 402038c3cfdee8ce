//! Approval status of project-defined MCP servers.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigResult, EffectiveConfig, IntoScope, ScopeConfigStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpServerApprovalStatus {
    Approved,
    Rejected,
    Pending,
}

impl McpServerApprovalStatus {
    /// Derive the status from merged settings.
    ///
    /// Checked in order: an explicit disable always beats both an explicit
    /// enable and `enableAllProjectMcpServers`.
    pub fn resolve(server_name: &str, config: &EffectiveConfig) -> Self {
        if config.disabled_mcpjson_servers.contains(server_name) {
            Self::Rejected
        } else if config.enabled_mcpjson_servers.contains(server_name)
            || config.enable_all_project_mcp_servers
        {
            Self::Approved
        } else {
            Self::Pending
        }
    }
}

impl fmt::Display for McpServerApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => f.write_str("approved"),
            Self::Rejected => f.write_str("rejected"),
            Self::Pending => f.write_str("pending"),
        }
    }
}

/// Reads and records MCP server approvals.
///
/// Holds no status of its own: every query is answered from the config it
/// is given or from a fresh merge of the store.
#[derive(Debug, Clone)]
pub struct McpApprovalRegistry {
    store: Arc<ScopeConfigStore>,
}

impl McpApprovalRegistry {
    pub fn new(store: Arc<ScopeConfigStore>) -> Self {
        Self { store }
    }

    pub fn get_approval_status(
        &self,
        server_name: &str,
        config: &EffectiveConfig,
    ) -> McpServerApprovalStatus {
        McpServerApprovalStatus::resolve(server_name, config)
    }

    /// Status against the settings currently on disk.
    pub async fn current_status(&self, server_name: &str) -> ConfigResult<McpServerApprovalStatus> {
        let config = self.store.merge().await?;
        Ok(McpServerApprovalStatus::resolve(server_name, &config))
    }

    /// Servers from `configured` that still need an operator decision.
    pub fn pending_servers<'a>(
        &self,
        configured: impl IntoIterator<Item = &'a str>,
        config: &EffectiveConfig,
    ) -> Vec<&'a str> {
        configured
            .into_iter()
            .filter(|name| {
                McpServerApprovalStatus::resolve(name, config) == McpServerApprovalStatus::Pending
            })
            .collect()
    }

    pub async fn approve(&self, server_name: &str, scope: impl IntoScope) -> ConfigResult<()> {
        let scope = scope.into_scope()?;
        self.store
            .update(scope, |c| c.enable_server(server_name))
            .await?;
        tracing::info!(server = server_name, scope = %scope, "MCP server approved");
        Ok(())
    }

    pub async fn reject(&self, server_name: &str, scope: impl IntoScope) -> ConfigResult<()> {
        let scope = scope.into_scope()?;
        self.store
            .update(scope, |c| c.disable_server(server_name))
            .await?;
        tracing::info!(server = server_name, scope = %scope, "MCP server rejected");
        Ok(())
    }
}
