//! Permission modes for controlling tool execution behavior.

use serde::{Deserialize, Serialize};

use crate::config::{EffectiveConfig, EnvSettings};

/// Session-wide permission mode.
///
/// # Modes
///
/// - **Default**: Standard permission flow. Deny rules reject, allow rules
///   approve, anything else is put to the operator.
///
/// - **AcceptEdits**: Like `Default`, but file operations that no deny rule
///   matches are approved without prompting.
///
/// - **BypassPermissions**: Every request is approved without evaluation.
///   ⚠️ Only for trusted, sandboxed environments. Each approval is audited.
///
/// - **Plan**: Read-only. File operations are rejected regardless of rules;
///   other tools go through normal evaluation.
///
/// # Example
///
/// ```rust
/// use tool_gate::permissions::PermissionMode;
///
/// assert_eq!(PermissionMode::resolve(Some("plan")), PermissionMode::Plan);
/// assert_eq!(PermissionMode::resolve(Some("yolo")), PermissionMode::Default);
/// assert_eq!(PermissionMode::resolve(None), PermissionMode::Default);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Standard permission flow - use allow/deny rules, otherwise prompt
    #[default]
    Default,

    /// Auto-approve file operations that are not denied
    AcceptEdits,

    /// Allow all tool executions without permission checks
    ///
    /// ⚠️ **Warning**: This mode bypasses all permission checks.
    BypassPermissions,

    /// Read-only mode
    Plan,
}

impl PermissionMode {
    /// Normalize a raw mode value. Total: unknown or missing values fall back
    /// to `Default`. Matching is exact and case-sensitive.
    pub fn resolve(raw: Option<&str>) -> Self {
        match raw {
            Some("default") => PermissionMode::Default,
            Some("acceptEdits") => PermissionMode::AcceptEdits,
            Some("bypassPermissions") => PermissionMode::BypassPermissions,
            Some("plan") => PermissionMode::Plan,
            Some(other) => {
                tracing::debug!(value = other, "Unknown permission mode, using default");
                PermissionMode::Default
            }
            None => PermissionMode::Default,
        }
    }

    /// Mode for a new session.
    ///
    /// Precedence: the force-bypass environment flag, then an explicit value
    /// (CLI flag or user command), then the merged `defaultMode`. A policy
    /// that disables bypass mode downgrades `BypassPermissions` to `Default`.
    pub fn for_session(
        explicit: Option<&str>,
        env: &EnvSettings,
        config: &EffectiveConfig,
    ) -> Self {
        let mode = if env.force_bypass {
            PermissionMode::BypassPermissions
        } else if explicit.is_some() {
            Self::resolve(explicit)
        } else {
            Self::resolve(config.default_mode.as_deref())
        };

        if mode.allows_all() && config.bypass_disabled {
            tracing::warn!("bypassPermissions mode is disabled by policy, using default");
            return PermissionMode::Default;
        }
        mode
    }

    pub fn allows_all(&self) -> bool {
        matches!(self, PermissionMode::BypassPermissions)
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, PermissionMode::Plan)
    }

    pub fn auto_approves_files(&self) -> bool {
        matches!(self, PermissionMode::AcceptEdits)
    }

    pub fn is_default(&self) -> bool {
        matches!(self, PermissionMode::Default)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
            PermissionMode::Plan => "plan",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PermissionMode::Default => "Standard permission flow with allow/deny rules",
            PermissionMode::AcceptEdits => "Auto-approve file operations",
            PermissionMode::BypassPermissions => "Allow all operations (dangerous)",
            PermissionMode::Plan => "Read-only mode",
        }
    }
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PermissionMode {
    type Err = String;

    /// Strict parse; use [`PermissionMode::resolve`] for the total form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PermissionMode::Default),
            "acceptEdits" => Ok(PermissionMode::AcceptEdits),
            "bypassPermissions" => Ok(PermissionMode::BypassPermissions),
            "plan" => Ok(PermissionMode::Plan),
            _ => Err(format!("Unknown permission mode: {}", s)),
        }
    }
}
