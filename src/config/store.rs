//! File-backed store for the three writable scopes plus an optional
//! read-only policy file.
//!
//! Layout (relative to the project root unless noted):
//! - user: `~/.claude/settings.json`
//! - project: `.claude/settings.json`
//! - local: `.claude/settings.local.json` (not committed)

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::effective::{EffectiveConfig, ScopeSnapshot};
use super::scope::{IntoScope, ScopeConfig, ScopeLevel};
use super::{ConfigError, ConfigResult};

const SETTINGS_DIR: &str = ".claude";
const SETTINGS_FILE: &str = "settings.json";
const LOCAL_SETTINGS_FILE: &str = "settings.local.json";

/// File locations of each scope.
#[derive(Debug, Clone)]
pub struct ScopePaths {
    /// `None` when no home directory can be determined.
    pub user: Option<PathBuf>,
    pub project: PathBuf,
    pub local: PathBuf,
}

impl ScopePaths {
    pub fn new(user: Option<PathBuf>, project: PathBuf, local: PathBuf) -> Self {
        Self {
            user,
            project,
            local,
        }
    }

    /// Standard locations for a project rooted at `project_dir`.
    pub fn for_project(project_dir: impl AsRef<Path>) -> Self {
        let dir = project_dir.as_ref().join(SETTINGS_DIR);
        Self {
            user: crate::home_dir().map(|h| h.join(SETTINGS_DIR).join(SETTINGS_FILE)),
            project: dir.join(SETTINGS_FILE),
            local: dir.join(LOCAL_SETTINGS_FILE),
        }
    }

    pub fn get(&self, scope: ScopeLevel) -> Option<&Path> {
        match scope {
            ScopeLevel::User => self.user.as_deref(),
            ScopeLevel::Project => Some(&self.project),
            ScopeLevel::Local => Some(&self.local),
        }
    }
}

/// Loads, saves and merges scope files.
///
/// Writes to a given scope are serialized through a per-scope lock, so two
/// concurrent `update` calls never interleave their read-modify-write.
#[derive(Debug)]
pub struct ScopeConfigStore {
    paths: ScopePaths,
    policy: Option<PathBuf>,
    write_locks: [Mutex<()>; 3],
}

impl ScopeConfigStore {
    pub fn new(paths: ScopePaths) -> Self {
        Self {
            paths,
            policy: None,
            write_locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
        }
    }

    pub fn for_project(project_dir: impl AsRef<Path>) -> Self {
        Self::new(ScopePaths::for_project(project_dir))
    }

    /// Attach an organization-managed settings file. It is merged with the
    /// highest precedence and never written.
    pub fn with_policy_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.policy = Some(path.into());
        self
    }

    pub fn paths(&self) -> &ScopePaths {
        &self.paths
    }

    pub fn path(&self, scope: impl IntoScope) -> ConfigResult<Option<&Path>> {
        let scope = scope.into_scope()?;
        Ok(self.paths.get(scope))
    }

    /// Load one scope. A missing file yields an empty config.
    pub async fn load(&self, scope: impl IntoScope) -> ConfigResult<ScopeConfig> {
        let scope = scope.into_scope()?;
        match self.paths.get(scope) {
            Some(path) => read_config(path).await,
            None => Ok(ScopeConfig::default()),
        }
    }

    /// Replace one scope file atomically.
    pub async fn save(&self, scope: impl IntoScope, config: &ScopeConfig) -> ConfigResult<()> {
        let scope = scope.into_scope()?;
        let path = self.writable_path(scope)?;
        let _guard = self.write_locks[scope.index()].lock().await;
        write_config(path, config).await?;
        tracing::debug!(scope = %scope, path = %path.display(), "Saved scope settings");
        Ok(())
    }

    /// Read-modify-write one scope under its write lock.
    pub async fn update<F, R>(&self, scope: impl IntoScope, f: F) -> ConfigResult<R>
    where
        F: FnOnce(&mut ScopeConfig) -> R,
    {
        let scope = scope.into_scope()?;
        let path = self.writable_path(scope)?;
        let _guard = self.write_locks[scope.index()].lock().await;

        let mut config = read_config(path).await?;
        let result = f(&mut config);
        write_config(path, &config).await?;
        tracing::debug!(scope = %scope, path = %path.display(), "Updated scope settings");
        Ok(result)
    }

    /// Read every tier as it is on disk right now.
    pub async fn snapshot(&self) -> ConfigResult<ScopeSnapshot> {
        let policy = match &self.policy {
            Some(path) => Some(read_config(path).await?),
            None => None,
        };
        Ok(ScopeSnapshot {
            policy,
            user: self.load(ScopeLevel::User).await?,
            project: self.load(ScopeLevel::Project).await?,
            local: self.load(ScopeLevel::Local).await?,
        })
    }

    /// Re-read and merge every tier. Nothing is cached between calls.
    pub async fn merge(&self) -> ConfigResult<EffectiveConfig> {
        Ok(EffectiveConfig::merge(&self.snapshot().await?))
    }

    fn writable_path(&self, scope: ScopeLevel) -> ConfigResult<&Path> {
        self.paths
            .get(scope)
            .ok_or(ConfigError::MissingPath { scope })
    }
}

async fn read_config(path: &Path) -> ConfigResult<ScopeConfig> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ScopeConfig::default()),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(ScopeConfig::default());
    }
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_config(path: &Path, config: &ScopeConfig) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut content = serde_json::to_string_pretty(config)?;
    content.push('\n');

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| SETTINGS_FILE.to_string());
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let written = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}
