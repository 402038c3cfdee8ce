//! Merged view of every configuration tier, built once per decision.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::scope::{ScopeConfig, ScopeLevel};
use crate::permissions::Rule;

/// Where a merged rule or setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingsSource {
    User,
    Project,
    Local,
    /// Organization-managed settings; read-only.
    Policy,
}

impl From<ScopeLevel> for SettingsSource {
    fn from(scope: ScopeLevel) -> Self {
        match scope {
            ScopeLevel::User => SettingsSource::User,
            ScopeLevel::Project => SettingsSource::Project,
            ScopeLevel::Local => SettingsSource::Local,
        }
    }
}

impl fmt::Display for SettingsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsSource::User => f.write_str("user"),
            SettingsSource::Project => f.write_str("project"),
            SettingsSource::Local => f.write_str("local"),
            SettingsSource::Policy => f.write_str("policy"),
        }
    }
}

/// A parsed rule together with the tier that declared it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcedRule {
    pub rule: Rule,
    pub source: SettingsSource,
}

/// The raw tiers handed to [`EffectiveConfig::merge`].
#[derive(Debug, Clone, Default)]
pub struct ScopeSnapshot {
    pub policy: Option<ScopeConfig>,
    pub user: ScopeConfig,
    pub project: ScopeConfig,
    pub local: ScopeConfig,
}

impl ScopeSnapshot {
    pub fn get(&self, scope: ScopeLevel) -> &ScopeConfig {
        match scope {
            ScopeLevel::User => &self.user,
            ScopeLevel::Project => &self.project,
            ScopeLevel::Local => &self.local,
        }
    }

    pub fn get_mut(&mut self, scope: ScopeLevel) -> &mut ScopeConfig {
        match scope {
            ScopeLevel::User => &mut self.user,
            ScopeLevel::Project => &mut self.project,
            ScopeLevel::Local => &mut self.local,
        }
    }

    /// Tiers in merge order, lowest precedence first.
    fn tiers(&self) -> impl Iterator<Item = (SettingsSource, &ScopeConfig)> {
        [
            (SettingsSource::User, Some(&self.user)),
            (SettingsSource::Project, Some(&self.project)),
            (SettingsSource::Local, Some(&self.local)),
            (SettingsSource::Policy, self.policy.as_ref()),
        ]
        .into_iter()
        .filter_map(|(source, config)| config.map(|c| (source, c)))
    }
}

/// Immutable merge of all tiers.
///
/// Allow and deny rules are unioned across tiers; the decision engine
/// evaluates deny before allow, so a deny at any tier beats an allow at any
/// other. Scalars follow last-writer-wins in `user < project < local <
/// policy` order.
#[derive(Debug, Clone, Default)]
pub struct EffectiveConfig {
    pub allow_rules: Vec<SourcedRule>,
    pub deny_rules: Vec<SourcedRule>,
    pub enabled_mcpjson_servers: BTreeSet<String>,
    pub disabled_mcpjson_servers: BTreeSet<String>,
    pub enable_all_project_mcp_servers: bool,
    pub default_mode: Option<String>,
    pub bypass_disabled: bool,
    pub malformed_rules: usize,
}

impl EffectiveConfig {
    pub fn merge(snapshot: &ScopeSnapshot) -> Self {
        let mut merged = Self::default();

        for (source, config) in snapshot.tiers() {
            merged.malformed_rules += extend_rules(&mut merged.allow_rules, &config.allow_rules, source);
            merged.malformed_rules += extend_rules(&mut merged.deny_rules, &config.deny_rules, source);

            merged
                .enabled_mcpjson_servers
                .extend(config.enabled_mcpjson_servers.iter().cloned());
            merged
                .disabled_mcpjson_servers
                .extend(config.disabled_mcpjson_servers.iter().cloned());

            if let Some(enable_all) = config.enable_all_project_mcp_servers {
                merged.enable_all_project_mcp_servers = enable_all;
            }
            if config.default_mode.is_some() {
                merged.default_mode = config.default_mode.clone();
            }
            if config.disables_bypass() {
                merged.bypass_disabled = true;
            }
        }

        merged
    }

    pub fn is_empty(&self) -> bool {
        self.allow_rules.is_empty()
            && self.deny_rules.is_empty()
            && self.enabled_mcpjson_servers.is_empty()
            && self.disabled_mcpjson_servers.is_empty()
            && !self.enable_all_project_mcp_servers
    }
}

fn extend_rules(target: &mut Vec<SourcedRule>, raw: &[String], source: SettingsSource) -> usize {
    let mut malformed = 0;
    for text in raw {
        match Rule::parse(text) {
            Ok(rule) => target.push(SourcedRule { rule, source }),
            Err(e) => {
                malformed += 1;
                tracing::warn!(source = %source, error = %e, "Skipping malformed permission rule");
            }
        }
    }
    malformed
}
