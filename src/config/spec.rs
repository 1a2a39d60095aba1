//! Configuration types for the `converge.deploy.yaml` manifest.
//!
//! A manifest names the project, where its target store lives, which
//! providers it uses, and the targets to declare for them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::plugin::{HookRef, ProviderRef};
use crate::state::STATE_DIR;

/// Default name of the dry-run snapshot file, inside the state directory.
pub const DRY_RUN_FILE: &str = "dry-run.json";

/// The root configuration structure for a deployment manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// Target store configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Secrets the run needs.
    #[serde(default)]
    pub secrets: SecretsConfig,
    /// Providers by name.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Targets to declare, in declaration order.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Unique name for the project.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Target store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Backend type (local or s3).
    #[serde(default)]
    pub backend: StateBackend,
    /// Local snapshot file path (for local backend).
    #[serde(default)]
    pub path: Option<String>,
    /// S3 bucket name (required for s3 backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// S3 key prefix (optional).
    #[serde(default)]
    pub prefix: Option<String>,
    /// S3 region (optional, uses AWS default if not specified).
    #[serde(default)]
    pub region: Option<String>,
    /// Where dry runs write the snapshot they would have committed.
    #[serde(default)]
    pub dry_run_file: Option<String>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Local file-based storage.
    #[default]
    Local,
    /// AWS S3-based storage.
    S3,
}

/// Secrets configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretsConfig {
    /// Dotenv file to load, relative to the manifest.
    #[serde(default)]
    pub env_file: Option<String>,
    /// Environment variables that must be set once secrets are loaded.
    #[serde(default)]
    pub required: Vec<String>,
}

/// A provider entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Hook reference the provider's plugin is loaded from.
    pub hook: String,
}

/// A target entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    /// Name of the provider the target is declared for.
    pub provider: String,
    /// The target record handed to the provider.
    pub spec: Value,
    /// Delay before the target resolves, in milliseconds.
    #[serde(default)]
    pub after_ms: Option<u64>,
}

fn default_environment() -> String {
    String::from("dev")
}

impl DeployConfig {
    /// Returns the reference of a named provider.
    #[must_use]
    pub fn provider_ref(&self, name: &str) -> Option<ProviderRef> {
        self.providers
            .get(name)
            .map(|p| ProviderRef::new(name, HookRef::new(p.hook.clone())))
    }

    /// Returns references to every configured provider, sorted by name.
    #[must_use]
    pub fn provider_refs(&self) -> Vec<ProviderRef> {
        self.providers
            .iter()
            .map(|(name, p)| ProviderRef::new(name.clone(), HookRef::new(p.hook.clone())))
            .collect()
    }
}

impl StateConfig {
    /// Directory of the local store, resolved against `base`.
    #[must_use]
    pub fn local_dir(&self, base: &Path) -> PathBuf {
        self.path
            .as_ref()
            .map(|p| base.join(p))
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| base.join(STATE_DIR))
    }

    /// Path of the dry-run side file, resolved against `base`.
    #[must_use]
    pub fn dry_run_path(&self, base: &Path) -> PathBuf {
        self.dry_run_file.as_ref().map_or_else(
            || self.local_dir(base).join(DRY_RUN_FILE),
            |p| base.join(p),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_path_defaults_to_state_dir() {
        let state = StateConfig::default();
        assert_eq!(
            state.dry_run_path(Path::new("/work")),
            PathBuf::from("/work/.converge/dry-run.json")
        );

        let state = StateConfig {
            path: Some(String::from("state/targets.json")),
            ..StateConfig::default()
        };
        assert_eq!(
            state.dry_run_path(Path::new("/work")),
            PathBuf::from("/work/state/dry-run.json")
        );
    }

    #[test]
    fn test_provider_refs_are_sorted() {
        let mut providers = BTreeMap::new();
        providers.insert(
            String::from("web"),
            ProviderConfig {
                hook: String::from("builtin:file"),
            },
        );
        providers.insert(
            String::from("dns"),
            ProviderConfig {
                hook: String::from("builtin:file:dns"),
            },
        );
        let config = DeployConfig {
            project: ProjectConfig {
                name: String::from("demo"),
                environment: default_environment(),
            },
            state: StateConfig::default(),
            secrets: SecretsConfig::default(),
            providers,
            targets: vec![],
        };

        let names: Vec<String> = config.provider_refs().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec![String::from("dns"), String::from("web")]);
        assert_eq!(
            config.provider_ref("dns").map(|p| p.hook),
            Some(HookRef::new("builtin:file:dns"))
        );
        assert!(config.provider_ref("db").is_none());
    }
}
