// ============================================================================
// Linting
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // Public items should be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(nonstandard_style)]           // Non-standard code style is forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Converge
//!
//! A declarative deployment reconciler.
//!
//! ## Overview
//!
//! A deploy script declares the targets that should exist, each owned by a
//! provider plugin. Converge compares them with the targets committed by the
//! previous run and calls the plugins to close the gap:
//!
//! - New targets are spawned
//! - Changed targets are updated (or replaced, if the plugin cannot update)
//! - Targets that are no longer declared are killed
//!
//! Every run is all-or-nothing. If any step fails, completed actions are
//! reverted newest first and the previous snapshot stays committed.
//!
//! ## Modules
//!
//! - [`config`]: Deployment manifest parsing and validation
//! - [`plugin`]: Provider plugin contract, loading, and the builtin file provider
//! - [`queue`]: Ordered declaration queue between the script and the reconciler
//! - [`planner`]: Structural diff, action journal, and revert stack
//! - [`reconciler`]: The run lifecycle
//! - [`script`]: Deploy scripts and secrets loading
//! - [`state`]: Target stores (local, S3) and run locking
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: shop
//!   environment: prod
//!
//! providers:
//!   sites:
//!     hook: "builtin:file:sites"
//!
//! targets:
//!   - provider: sites
//!     spec:
//!       name: storefront
//!       replicas: 2
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod plugin;
pub mod queue;
pub mod reconciler;
pub mod script;
pub mod state;
pub mod target;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, DeployConfig};
pub use error::{DeployError, Result};
pub use planner::{ChangeSet, DiffEngine, PlannedAction, RevertStack, RollbackReport};
pub use plugin::{DeployPlugin, HookRef, PluginLoader, ProviderRef, RevertFn};
pub use queue::{Declarer, DeclarationQueue};
pub use reconciler::{Reconciler, RunOutcome, RunReport};
pub use script::{DeployScript, ManifestScript, SecretsLoader};
pub use state::{LocalTargetStore, S3TargetStore, TargetSnapshot, TargetStore};
pub use target::{ResolvedTarget, TargetIdentity};
