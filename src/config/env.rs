//! Environment-variable settings.
//!
//! Read once at startup; the lookup is injectable so callers (and tests)
//! never need to mutate the process environment.

/// Default tool timeout override, in milliseconds.
pub const TIMEOUT_ENV: &str = "TOOL_GATE_TIMEOUT_MS";

/// Forces `bypassPermissions` for sandboxed or otherwise restricted
/// environments.
pub const FORCE_BYPASS_ENV: &str = "TOOL_GATE_FORCE_BYPASS";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSettings {
    pub timeout_ms: Option<u64>,
    pub force_bypass: bool,
}

impl EnvSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            timeout_ms: lookup(TIMEOUT_ENV).and_then(|raw| parse_timeout(&raw)),
            force_bypass: lookup(FORCE_BYPASS_ENV)
                .map(|raw| parse_flag(&raw))
                .unwrap_or(false),
        }
    }
}

fn parse_timeout(raw: &str) -> Option<u64> {
    match raw.trim().parse::<i64>() {
        Ok(ms) if ms > 0 => Some(ms as u64),
        _ => {
            tracing::warn!(var = TIMEOUT_ENV, value = raw, "Ignoring invalid timeout override");
            None
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
