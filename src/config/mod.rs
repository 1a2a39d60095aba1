//! Configuration module for converge.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `converge.deploy.yaml`
//! - Environment variable overrides
//! - Validation of configuration values

mod parser;
mod spec;
mod validator;

pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use spec::{
    DRY_RUN_FILE, DeployConfig, ProjectConfig, ProviderConfig, SecretsConfig, StateBackend,
    StateConfig, TargetConfig,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
