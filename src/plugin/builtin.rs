//! Built-in providers.
//!
//! The file provider materializes each target as a JSON document on disk.
//! It is small enough to reason about and exercises every hook, which makes
//! it useful for local runs and for trying out deploy manifests.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

use crate::error::PluginError;
use crate::planner::ChangeSet;

use super::registry::PluginLoader;
use super::{DeployPlugin, HookRef, PluginResult, RevertFn};

/// Hook reference of the file provider.
///
/// `builtin:file` writes under the loader's root; `builtin:file:<dir>` writes
/// under `<dir>`, relative to the loader's root when not absolute.
pub const FILE_HOOK: &str = "builtin:file";

/// Loader for `builtin:*` hook references.
#[derive(Debug, Clone)]
pub struct BuiltinLoader {
    /// Base directory for file provider output.
    root: PathBuf,
}

impl BuiltinLoader {
    /// Creates a loader rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl PluginLoader for BuiltinLoader {
    async fn load(&self, hook: &HookRef) -> PluginResult<Arc<dyn DeployPlugin>> {
        let Some(rest) = hook.as_str().strip_prefix(FILE_HOOK) else {
            return Err(PluginError::Load {
                hook: hook.to_string(),
                message: String::from("unknown builtin hook"),
            });
        };

        let root = match rest.strip_prefix(':') {
            Some(dir) if !dir.is_empty() => self.root.join(dir),
            None if rest.is_empty() => self.root.clone(),
            _ => {
                return Err(PluginError::Load {
                    hook: hook.to_string(),
                    message: String::from("expected builtin:file or builtin:file:<dir>"),
                });
            }
        };

        Ok(Arc::new(FilePlugin::new(root)))
    }
}

/// Provider storing each target as `<root>/<name>.json`.
#[derive(Debug, Clone)]
pub struct FilePlugin {
    /// Directory holding target documents.
    root: PathBuf,
}

impl FilePlugin {
    /// Creates a file provider writing under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the document path for a target.
    fn path_for(&self, target: &Value) -> PluginResult<PathBuf> {
        let name = target_name(target)?;
        Ok(self.root.join(format!("{name}.json")))
    }

    /// Writes a target document and returns the content it replaced.
    async fn write_target(&self, target: &Value) -> PluginResult<(PathBuf, Option<Vec<u8>>)> {
        let path = self.path_for(target)?;
        let previous = read_optional(&path).await?;

        fs::create_dir_all(&self.root).await?;
        let content = serde_json::to_vec_pretty(target)
            .map_err(|e| PluginError::invalid_target(format!("cannot serialize target: {e}")))?;
        fs::write(&path, content).await?;
        debug!("Wrote {}", path.display());

        Ok((path, previous))
    }
}

#[async_trait]
impl DeployPlugin for FilePlugin {
    fn name(&self) -> &str {
        "file"
    }

    async fn identify(&self, target: &Value) -> PluginResult<Value> {
        let name = target_name(target)?;
        Ok(serde_json::json!({ "name": name }))
    }

    async fn spawn(&self, target: &Value) -> PluginResult<Option<RevertFn>> {
        let (path, previous) = self.write_target(target).await?;
        Ok(Some(restore(path, previous)))
    }

    fn supports_update(&self) -> bool {
        true
    }

    async fn update(&self, target: &Value, changes: &ChangeSet) -> PluginResult<Option<RevertFn>> {
        debug!("Updating fields: {}", changes.paths().join(", "));
        let (path, previous) = self.write_target(target).await?;
        Ok(Some(restore(path, previous)))
    }

    async fn kill(&self, target: &Value) -> PluginResult<Option<RevertFn>> {
        let path = self.path_for(target)?;
        let previous = read_optional(&path).await?;
        if previous.is_some() {
            fs::remove_file(&path).await?;
            debug!("Removed {}", path.display());
        }
        Ok(Some(restore(path, previous)))
    }
}

/// Extracts and checks the `name` field used as the file stem.
fn target_name(target: &Value) -> PluginResult<&str> {
    let name = target
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| PluginError::invalid_target("file targets need a string 'name' field"))?;

    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(PluginError::invalid_target(format!(
            "'{name}' is not a valid file target name"
        )));
    }
    Ok(name)
}

async fn read_optional(path: &Path) -> PluginResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Builds a revert putting `path` back to `previous` (absent when `None`).
fn restore(path: PathBuf, previous: Option<Vec<u8>>) -> RevertFn {
    RevertFn::new(async move {
        let restored = match previous {
            Some(content) => fs::write(&path, content).await,
            None => match fs::remove_file(&path).await {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        restored.map_err(PluginError::from)?;
        debug!("Restored {}", path.display());
        Ok::<(), PluginError>(())
    })
}
