//! Configuration validation for deployment manifests.
//!
//! Every problem found is collected; validation fails with the first error
//! but the full list is available to callers that want to report it.

use crate::error::{ConfigError, DeployError, Result};
use std::collections::BTreeSet;
use tracing::debug;

use super::spec::{DeployConfig, ProjectConfig, ProviderConfig, StateBackend, StateConfig, TargetConfig};

/// Validator for deployment manifests.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all problems found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Checks a manifest and returns every problem found.
    #[must_use]
    pub fn check(&self, config: &DeployConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_project(&config.project, &mut result);
        Self::validate_state(&config.state, &mut result);
        Self::validate_providers(config, &mut result);
        Self::validate_targets(config, &mut result);

        result
    }

    /// Validates a manifest.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self, config: &DeployConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        match result.errors.first() {
            None => {
                debug!("Configuration validation passed");
                Ok(result)
            }
            Some(first_error) => Err(DeployError::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            ))),
        }
    }

    fn validate_project(project: &ProjectConfig, result: &mut ValidationResult) {
        if project.name.is_empty() {
            result.error("project.name", "Project name cannot be empty");
        } else if !is_valid_name(&project.name) {
            result.error(
                "project.name",
                format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.name
                ),
            );
        }

        if project.environment.is_empty() {
            result.error("project.environment", "Environment cannot be empty");
        }
    }

    fn validate_state(state: &StateConfig, result: &mut ValidationResult) {
        match state.backend {
            StateBackend::S3 => {
                if state.bucket.as_ref().is_none_or(String::is_empty) {
                    result.error(
                        "state.bucket",
                        "S3 bucket name is required when using S3 backend",
                    );
                }
                if state.path.is_some() {
                    result
                        .warnings
                        .push(String::from("state.path is ignored by the S3 backend"));
                }
            }
            StateBackend::Local => {
                if state.bucket.is_some() {
                    result
                        .warnings
                        .push(String::from("state.bucket is ignored by the local backend"));
                }
                if state.path.as_ref().is_some_and(String::is_empty) {
                    result.error("state.path", "State path cannot be empty");
                }
            }
        }
    }

    fn validate_providers(config: &DeployConfig, result: &mut ValidationResult) {
        if config.providers.is_empty() {
            result.warnings.push(String::from(
                "No providers configured; every previously applied target will be killed",
            ));
        }

        for (name, ProviderConfig { hook }) in &config.providers {
            let field = format!("providers.{name}");
            if !is_valid_name(name) {
                result.error(
                    &field,
                    format!("Provider name '{name}' is invalid. Must be lowercase alphanumeric with hyphens."),
                );
            }
            if hook.trim().is_empty() {
                result.error(format!("{field}.hook"), "Hook reference cannot be empty");
            }
        }

        let used: BTreeSet<&str> = config.targets.iter().map(|t| t.provider.as_str()).collect();
        for name in config.providers.keys().filter(|n| !used.contains(n.as_str())) {
            result.warnings.push(format!(
                "Provider '{name}' declares no targets; its previously applied targets will be killed"
            ));
        }
    }

    fn validate_targets(config: &DeployConfig, result: &mut ValidationResult) {
        for (i, TargetConfig { provider, spec, .. }) in config.targets.iter().enumerate() {
            let field = format!("targets[{i}]");
            if !config.providers.contains_key(provider) {
                result.error(
                    format!("{field}.provider"),
                    format!("Target references unknown provider '{provider}'"),
                );
            }
            if !spec.is_object() {
                result.error(format!("{field}.spec"), "Target spec must be a mapping");
            }
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.ends_with('-')
        && !name.contains("--")
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(yaml: &str) -> DeployConfig {
        ConfigParser::new().parse_yaml(yaml, None).expect("parse failed")
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("web"));
        assert!(is_valid_name("my-sites-2"));
        assert!(is_valid_name("a"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Web")); // uppercase
        assert!(!is_valid_name("2web")); // starts with number
        assert!(!is_valid_name("my_sites")); // underscore
        assert!(!is_valid_name("web-")); // ends with hyphen
        assert!(!is_valid_name("my--sites")); // consecutive hyphens
    }

    #[test]
    fn test_valid_manifest() {
        let config = parse(
            r#"
project:
  name: shop
providers:
  sites:
    hook: "builtin:file"
targets:
  - provider: sites
    spec: { name: storefront }
"#,
        );
        let result = ConfigValidator::new().validate(&config).expect("should be valid");
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_unknown_provider_and_scalar_spec() {
        let config = parse(
            r#"
project:
  name: shop
providers:
  sites:
    hook: "builtin:file"
targets:
  - provider: dns
    spec: { name: a }
  - provider: sites
    spec: 42
"#,
        );
        let result = ConfigValidator::new().check(&config);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["targets[0].provider", "targets[1].spec"]);

        let err = ConfigValidator::new().validate(&config).expect_err("should fail");
        assert!(err.to_string().contains("unknown provider 'dns'"));
    }

    #[test]
    fn test_s3_requires_bucket() {
        let config = parse(
            r"
project:
  name: shop
state:
  backend: s3
",
        );
        let result = ConfigValidator::new().check(&config);
        assert!(!result.is_valid());
        assert_eq!(result.errors[0].field, "state.bucket");
    }

    #[test]
    fn test_unused_provider_warns() {
        let config = parse(
            r#"
project:
  name: shop
providers:
  legacy:
    hook: "builtin:file:legacy"
"#,
        );
        let result = ConfigValidator::new().check(&config);
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("'legacy'")));
    }
}
