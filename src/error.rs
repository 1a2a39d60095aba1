//! Error types for the converge reconciliation engine.
//!
//! This module provides the error hierarchy for every stage of a run:
//! configuration, target store, plugins, declarations, and reconciliation.

use std::path::PathBuf;
use thiserror::Error;

use crate::planner::RollbackReport;
use crate::plugin::{ActionContext, HookAction};

/// The main error type for the converge engine.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Target store errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Plugin errors raised outside of a target action (loading, setup).
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// Target declaration errors.
    #[error("Declaration error: {0}")]
    Declare(#[from] DeclareError),

    /// A plugin hook failed while acting on a target.
    #[error("{0}")]
    Action(#[from] ActionError),

    /// Reconciliation-level errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// The apply phase failed and the revert stack was unwound.
    #[error("Apply failed ({rollback}): {source}")]
    Apply {
        /// The error that aborted the run.
        source: Box<DeployError>,
        /// Outcome of the rollback sweep.
        rollback: RollbackReport,
    },

    /// Every action succeeded but the new snapshot could not be written.
    #[error("State not saved after a successful apply; the target store needs manual reconciliation: {source}")]
    StateNotSaved {
        /// The store error.
        source: Box<DeployError>,
    },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A required secret is not present in the environment.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Target store errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Stored snapshot is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Writing to the store failed.
    #[error("Failed to write state to {location}: {message}")]
    WriteFailed {
        /// File path or object key.
        location: String,
        /// Description of the failure.
        message: String,
    },

    /// Lock acquisition or release failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// Another run holds the lock.
    #[error("A deployment is already in progress (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// S3 backend error.
    #[error("S3 state backend error: {message}")]
    S3Error {
        /// Description of the S3 error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// Snapshot format version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Errors raised by plugins and the plugin loader.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The hook reference could not be resolved to a plugin.
    #[error("Failed to load plugin '{hook}': {message}")]
    Load {
        /// Hook reference that failed.
        hook: String,
        /// Description of the failure.
        message: String,
    },

    /// The plugin does not implement the requested capability.
    #[error("Plugin does not support {action}")]
    Unsupported {
        /// The missing capability.
        action: HookAction,
    },

    /// The target is not acceptable to this plugin.
    #[error("Invalid target: {message}")]
    InvalidTarget {
        /// Description of the problem.
        message: String,
    },

    /// The provider reported a failure.
    #[error("{message}")]
    Failed {
        /// Provider-supplied message.
        message: String,
    },

    /// IO errors inside a provider.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A plugin failure tagged with the provider and hook that were active.
#[derive(Debug, Error)]
#[error("{context} failed: {source}")]
pub struct ActionError {
    /// Where the failure happened.
    pub context: ActionContext,
    /// The plugin error.
    pub source: PluginError,
}

/// Errors raised while collecting target declarations.
#[derive(Debug, Error)]
pub enum DeclareError {
    /// The asynchronous resolution of a target failed.
    #[error("Target #{index} for provider '{provider}' failed to resolve: {source}")]
    TargetFailed {
        /// Declaration index.
        index: u64,
        /// Provider name.
        provider: String,
        /// Underlying error.
        source: Box<DeployError>,
    },

    /// The task resolving a target panicked or was cancelled.
    #[error("Target #{index} for provider '{provider}' did not complete: {message}")]
    Aborted {
        /// Declaration index.
        index: u64,
        /// Provider name.
        provider: String,
        /// Description of the abort.
        message: String,
    },

    /// A resolved target is not a key/value record.
    #[error("Target #{index} for provider '{provider}' is not an object")]
    NotAnObject {
        /// Declaration index.
        index: u64,
        /// Provider name.
        provider: String,
    },

    /// The declaration stream ended with an index never delivered.
    #[error("Declaration #{index} was never received")]
    MissingDeclaration {
        /// The index the cursor was waiting for.
        index: u64,
    },

    /// The run stopped accepting declarations.
    #[error("Declaration queue is closed")]
    QueueClosed,
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The run was cancelled from outside.
    #[error("Reconciliation cancelled: {reason}")]
    Cancelled {
        /// Reason for the cancellation.
        reason: String,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Result type alias for converge operations.
pub type Result<T> = std::result::Result<T, DeployError>;

impl DeployError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the run stopped before any action was attempted.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::State(StateError::LockedByOther { .. } | StateError::LockFailed { .. })
        )
    }

    /// Returns true if retrying the same run later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::State(StateError::LockedByOther { .. } | StateError::LockFailed { .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates an S3 error with the given message.
    #[must_use]
    pub fn s3(message: impl Into<String>) -> Self {
        Self::S3Error {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl PluginError {
    /// Creates a provider failure with the given message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Creates an invalid target error.
    #[must_use]
    pub fn invalid_target(message: impl Into<String>) -> Self {
        Self::InvalidTarget {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_contention_is_precondition() {
        let err = DeployError::State(StateError::LockedByOther {
            holder: String::from("host-1"),
            since: String::from("2026-01-01T00:00:00Z"),
        });
        assert!(err.is_precondition());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("already in progress"));
    }

    #[test]
    fn test_action_error_names_provider_and_hook() {
        let err = DeployError::from(ActionError {
            context: ActionContext::new("web", HookAction::Spawn),
            source: PluginError::failed("quota exceeded"),
        });
        let message = err.to_string();
        assert!(message.contains("spawn"));
        assert!(message.contains("'web'"));
        assert!(message.contains("quota exceeded"));
        assert!(!err.is_precondition());
    }
}
