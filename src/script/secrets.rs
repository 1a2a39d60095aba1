//! Dotenv-backed secrets loader.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::{ConfigError, DeployError, Result};

use super::SecretsLoader;

/// Loads a dotenv file and checks that required variables are present.
#[derive(Debug, Clone)]
pub struct DotenvSecrets {
    /// Dotenv file to load.
    env_path: PathBuf,
    /// Whether a missing file is an error.
    explicit: bool,
    /// Variables that must be set afterwards.
    required: Vec<String>,
}

impl DotenvSecrets {
    /// Loads `.env` if present.
    #[must_use]
    pub fn new(env_path: impl Into<PathBuf>) -> Self {
        Self {
            env_path: env_path.into(),
            explicit: false,
            required: Vec::new(),
        }
    }

    /// Loads a file that must exist.
    #[must_use]
    pub fn explicit(env_path: impl Into<PathBuf>) -> Self {
        Self {
            explicit: true,
            ..Self::new(env_path)
        }
    }

    /// Sets the variables that must be present.
    #[must_use]
    pub fn with_required(mut self, required: Vec<String>) -> Self {
        self.required = required;
        self
    }
}

#[async_trait]
impl SecretsLoader for DotenvSecrets {
    async fn load(&self) -> Result<()> {
        if self.env_path.exists() {
            info!("Loading environment from: {}", self.env_path.display());
            dotenvy::from_path(&self.env_path).map_err(|e| {
                DeployError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(self.env_path.display().to_string()),
                })
            })?;
        } else if self.explicit {
            return Err(DeployError::Config(ConfigError::FileNotFound {
                path: self.env_path.clone(),
            }));
        } else {
            debug!(".env file not found at: {}", self.env_path.display());
        }

        if let Some(missing) = self.required.iter().find(|name| std::env::var(name).is_err()) {
            return Err(DeployError::Config(ConfigError::MissingEnvVar {
                name: missing.clone(),
            }));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_loads_file_and_checks_required() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join(".env");
        std::fs::write(&path, "CONVERGE_SECRETS_TEST_TOKEN=s3cret\n").expect("write failed");

        DotenvSecrets::explicit(&path)
            .with_required(vec![String::from("CONVERGE_SECRETS_TEST_TOKEN")])
            .load()
            .await
            .expect("load failed");
        assert_eq!(
            std::env::var("CONVERGE_SECRETS_TEST_TOKEN").as_deref(),
            Ok("s3cret")
        );
    }

    #[tokio::test]
    async fn test_missing_required_variable() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let err = DotenvSecrets::new(temp.path().join(".env"))
            .with_required(vec![String::from("CONVERGE_SECRETS_TEST_ABSENT")])
            .load()
            .await
            .expect_err("should fail");
        assert!(matches!(
            err,
            DeployError::Config(ConfigError::MissingEnvVar { ref name }) if name == "CONVERGE_SECRETS_TEST_ABSENT"
        ));
    }

    #[tokio::test]
    async fn test_explicit_file_must_exist() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let result = DotenvSecrets::explicit(temp.path().join("prod.env")).load().await;
        assert!(matches!(
            result,
            Err(DeployError::Config(ConfigError::FileNotFound { .. }))
        ));
    }
}
