//! Scope levels and the on-disk shape of a single scope file.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{ConfigError, ConfigResult};

/// Writable configuration tier a decision can be persisted to.
///
/// Ordered from lowest to highest precedence for scalar settings:
/// `User` < `Project` < `Local`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeLevel {
    /// Global settings in the user's home directory.
    User,
    /// Shared settings checked into the repository.
    Project,
    /// Private, per-project settings (not committed).
    #[default]
    Local,
}

impl ScopeLevel {
    pub const ALL: [ScopeLevel; 3] = [ScopeLevel::User, ScopeLevel::Project, ScopeLevel::Local];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeLevel::User => "user",
            ScopeLevel::Project => "project",
            ScopeLevel::Local => "local",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            ScopeLevel::User => 0,
            ScopeLevel::Project => 1,
            ScopeLevel::Local => 2,
        }
    }
}

impl fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ScopeLevel::User),
            "project" => Ok(ScopeLevel::Project),
            "local" => Ok(ScopeLevel::Local),
            other => Err(ConfigError::InvalidScope {
                value: other.to_string(),
            }),
        }
    }
}

/// Anything a public entry point accepts as a scope argument.
///
/// Strings are validated on every call; there is no normalization of
/// unknown names.
pub trait IntoScope {
    fn into_scope(self) -> ConfigResult<ScopeLevel>;
}

impl IntoScope for ScopeLevel {
    fn into_scope(self) -> ConfigResult<ScopeLevel> {
        Ok(self)
    }
}

impl IntoScope for &str {
    fn into_scope(self) -> ConfigResult<ScopeLevel> {
        self.parse()
    }
}

impl IntoScope for String {
    fn into_scope(self) -> ConfigResult<ScopeLevel> {
        self.as_str().parse()
    }
}

impl IntoScope for &String {
    fn into_scope(self) -> ConfigResult<ScopeLevel> {
        self.as_str().parse()
    }
}

/// Contents of one scope file.
///
/// Rule lists are kept as raw strings; parsing happens in the matcher so a
/// single malformed entry never prevents the file from loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeConfig {
    #[serde(default)]
    pub allow_rules: Vec<String>,

    #[serde(default)]
    pub deny_rules: Vec<String>,

    #[serde(default)]
    pub enabled_mcpjson_servers: Vec<String>,

    #[serde(default)]
    pub disabled_mcpjson_servers: Vec<String>,

    /// `None` when the file does not set the key, so a lower tier's value
    /// survives the merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_all_project_mcp_servers: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_bypass_permissions_mode: Option<String>,

    /// Keys this engine does not own, preserved across `save`.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ScopeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enables_all_project_mcp_servers(&self) -> bool {
        self.enable_all_project_mcp_servers.unwrap_or(false)
    }

    pub fn disables_bypass(&self) -> bool {
        self.disable_bypass_permissions_mode.as_deref() == Some("disable")
    }

    pub fn is_empty(&self) -> bool {
        self.allow_rules.is_empty()
            && self.deny_rules.is_empty()
            && self.enabled_mcpjson_servers.is_empty()
            && self.disabled_mcpjson_servers.is_empty()
            && self.enable_all_project_mcp_servers.is_none()
            && self.default_mode.is_none()
            && self.disable_bypass_permissions_mode.is_none()
    }

    /// Adds an allow rule unless an identical one is already present.
    pub fn add_allow_rule(&mut self, rule: impl Into<String>) -> bool {
        push_unique(&mut self.allow_rules, rule.into())
    }

    /// Adds a deny rule unless an identical one is already present.
    pub fn add_deny_rule(&mut self, rule: impl Into<String>) -> bool {
        push_unique(&mut self.deny_rules, rule.into())
    }

    pub fn enable_server(&mut self, server: &str) {
        self.disabled_mcpjson_servers.retain(|s| s != server);
        push_unique(&mut self.enabled_mcpjson_servers, server.to_string());
    }

    pub fn disable_server(&mut self, server: &str) {
        self.enabled_mcpjson_servers.retain(|s| s != server);
        push_unique(&mut self.disabled_mcpjson_servers, server.to_string());
    }
}

fn push_unique(list: &mut Vec<String>, value: String) -> bool {
    if list.contains(&value) {
        false
    } else {
        list.push(value);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_from_str() {
        assert_eq!("local".parse::<ScopeLevel>().unwrap(), ScopeLevel::Local);
        assert_eq!("project".parse::<ScopeLevel>().unwrap(), ScopeLevel::Project);
        assert_eq!("user".parse::<ScopeLevel>().unwrap(), ScopeLevel::User);
    }

    #[test]
    fn test_invalid_scope_is_not_normalized() {
        for bad in ["global", "Local", "", "policy"] {
            let err = bad.parse::<ScopeLevel>().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidScope { ref value } if value == bad));
        }
    }

    #[test]
    fn test_into_scope() {
        assert_eq!(ScopeLevel::User.into_scope().unwrap(), ScopeLevel::User);
        assert_eq!("project".into_scope().unwrap(), ScopeLevel::Project);
        assert!(String::from("global").into_scope().is_err());
    }

    #[test]
    fn test_scope_config_wire_format() {
        let json = r#"{
            "allowRules": ["Bash(git status)"],
            "denyRules": ["Bash(rm:*)"],
            "enabledMcpjsonServers": ["github"],
            "disabledMcpjsonServers": ["foo"],
            "enableAllProjectMcpServers": true,
            "model": "opus"
        }"#;
        let config: ScopeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.allow_rules, vec!["Bash(git status)"]);
        assert_eq!(config.deny_rules, vec!["Bash(rm:*)"]);
        assert_eq!(config.enabled_mcpjson_servers, vec!["github"]);
        assert_eq!(config.disabled_mcpjson_servers, vec!["foo"]);
        assert!(config.enables_all_project_mcp_servers());
        assert_eq!(config.extra["model"], "opus");

        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["model"], "opus");
        assert_eq!(back["allowRules"][0], "Bash(git status)");
    }

    #[test]
    fn test_empty_config_defaults() {
        let config: ScopeConfig = serde_json::from_str("{}").unwrap();
        assert!(config.is_empty());
        assert!(!config.enables_all_project_mcp_servers());
        assert!(!config.disables_bypass());
    }

    #[test]
    fn test_add_rule_deduplicates() {
        let mut config = ScopeConfig::new();
        assert!(config.add_allow_rule("Read"));
        assert!(!config.add_allow_rule("Read"));
        assert_eq!(config.allow_rules.len(), 1);
    }

    #[test]
    fn test_enable_disable_server_moves_between_lists() {
        let mut config = ScopeConfig::new();
        config.enable_server("github");
        assert_eq!(config.enabled_mcpjson_servers, vec!["github"]);

        config.disable_server("github");
        assert!(config.enabled_mcpjson_servers.is_empty());
        assert_eq!(config.disabled_mcpjson_servers, vec!["github"]);
    }
}
