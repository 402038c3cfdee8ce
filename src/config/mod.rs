//! Scoped permission settings.
//!
//! ```rust,no_run
//! use tool_gate::config::{ScopeConfigStore, ScopeLevel};
//!
//! # async fn example() -> Result<(), tool_gate::config::ConfigError> {
//! let store = ScopeConfigStore::for_project(".");
//! store
//!     .update(ScopeLevel::Local, |c| c.add_allow_rule("Bash(git status)"))
//!     .await?;
//! let effective = store.merge().await?;
//! assert!(!effective.allow_rules.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod effective;
pub mod env;
pub mod scope;
pub mod store;

pub use effective::{EffectiveConfig, ScopeSnapshot, SettingsSource, SourcedRule};
pub use env::{EnvSettings, FORCE_BYPASS_ENV, TIMEOUT_ENV};
pub use scope::{IntoScope, ScopeConfig, ScopeLevel};
pub use store::{ScopeConfigStore, ScopePaths};

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in configuration operations
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Scope name outside `local`, `project`, `user`
    #[error("Invalid scope '{value}': expected one of local, project, user")]
    InvalidScope {
        /// The rejected scope name
        value: String,
    },

    /// A scope file exists but is not valid settings JSON
    #[error("Corrupt settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// No file location is known for this scope (e.g. no home directory)
    #[error("No settings file location for scope '{scope}'")]
    MissingPath { scope: ScopeLevel },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidScope {
            value: "global".to_string(),
        };
        assert!(err.to_string().contains("global"));

        let err = ConfigError::MissingPath {
            scope: ScopeLevel::User,
        };
        assert!(err.to_string().contains("user"));
    }
}
