//! Configuration parser for loading deployment manifests.
//!
//! This module handles loading the manifest from YAML and applying
//! environment variable overrides.

use crate::error::{ConfigError, DeployError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::DeployConfig;

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["converge.deploy.yaml", "converge.deploy.yml"];

/// Configuration parser for loading deployment manifests.
#[derive(Debug, Default)]
pub struct ConfigParser;

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(DeployError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeployConfig> {
        debug!("Parsing YAML configuration");

        let config: DeployConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = e
                .location()
                .map(|l| format!("line {}, column {}", l.line(), l.column()));
            let location = match (source, location) {
                (Some(path), Some(at)) => Some(format!("{}:{at}", path.display())),
                (Some(path), None) => Some(path.display().to_string()),
                (None, at) => at,
            };
            DeployError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed configuration for project '{}' ({} provider(s), {} target(s))",
            config.project.name,
            config.providers.len(),
            config.targets.len()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Overrides use the form `CONVERGE_<SECTION>_<KEY>`
    /// (e.g., `CONVERGE_STATE_BUCKET`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }

    /// Applies overrides looked up through `lookup`.
    pub fn apply_overrides<F>(config: &mut DeployConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("CONVERGE_PROJECT_NAME") {
            debug!("Overriding project.name from environment");
            config.project.name = name;
        }

        if let Some(env) = lookup("CONVERGE_PROJECT_ENVIRONMENT") {
            debug!("Overriding project.environment from environment");
            config.project.environment = env;
        }

        if let Some(path) = lookup("CONVERGE_STATE_PATH") {
            debug!("Overriding state.path from environment");
            config.state.path = Some(path);
        }

        if let Some(bucket) = lookup("CONVERGE_STATE_BUCKET") {
            debug!("Overriding state.bucket from environment");
            config.state.bucket = Some(bucket);
        }

        if let Some(prefix) = lookup("CONVERGE_STATE_PREFIX") {
            debug!("Overriding state.prefix from environment");
            config.state.prefix = Some(prefix);
        }
    }
}

/// Finds the configuration file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(DeployError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateBackend;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
project:
  name: shop
  environment: prod

state:
  backend: s3
  bucket: shop-state
  prefix: shop/prod

secrets:
  env_file: .env
  required: [API_TOKEN]

providers:
  sites:
    hook: "builtin:file:sites"
  dns:
    hook: "builtin:file:dns"

targets:
  - provider: sites
    spec:
      name: storefront
      replicas: 2
  - provider: dns
    after_ms: 20
    spec:
      name: shop-example-com
      records: ["10.0.0.1"]
"#;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
project:
  name: test-project
";
        let config = ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("parse failed");
        assert_eq!(config.project.name, "test-project");
        assert_eq!(config.project.environment, "dev");
        assert_eq!(config.state.backend, StateBackend::Local);
        assert!(config.providers.is_empty());
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config = ConfigParser::new()
            .parse_yaml(MANIFEST, None)
            .expect("parse failed");

        assert_eq!(config.project.name, "shop");
        assert_eq!(config.state.backend, StateBackend::S3);
        assert_eq!(config.secrets.required, vec![String::from("API_TOKEN")]);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.targets[0].spec["replicas"], 2);
        assert_eq!(config.targets[1].after_ms, Some(20));
    }

    #[test]
    fn test_parse_error_has_location() {
        let err = ConfigParser::new()
            .parse_yaml("project: [unclosed", Some(Path::new("converge.deploy.yaml")))
            .expect_err("should fail");
        match err {
            DeployError::Config(ConfigError::ParseError { location, .. }) => {
                assert!(location.is_some_and(|l| l.starts_with("converge.deploy.yaml")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ConfigParser::new()
            .parse_yaml(MANIFEST, None)
            .expect("parse failed");
        let env: HashMap<&str, &str> = [
            ("CONVERGE_PROJECT_NAME", "shop-canary"),
            ("CONVERGE_STATE_PREFIX", "shop/canary"),
        ]
        .into_iter()
        .collect();

        ConfigParser::apply_overrides(&mut config, |name| env.get(name).map(|v| (*v).to_string()));

        assert_eq!(config.project.name, "shop-canary");
        assert_eq!(config.state.prefix.as_deref(), Some("shop/canary"));
        assert_eq!(config.state.bucket.as_deref(), Some("shop-state"));
    }

    #[test]
    fn test_find_config_file_searches_parents() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let manifest = temp.path().join(DEFAULT_CONFIG_FILES[0]);
        std::fs::write(&manifest, MANIFEST).expect("write failed");
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir failed");

        assert_eq!(find_config_file(&nested).expect("not found"), manifest);
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let err = ConfigParser::new()
            .load_file(temp.path().join("nope.yaml"))
            .expect_err("should fail");
        assert!(matches!(err, DeployError::Config(ConfigError::FileNotFound { .. })));
    }
}
