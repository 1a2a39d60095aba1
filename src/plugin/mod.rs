//! Plugin capability contract.
//!
//! Every provider implements [`DeployPlugin`]. The reconciler never knows
//! what a provider manages; it only calls these hooks, in declaration order,
//! and records the [`RevertFn`] each successful action hands back.

mod builtin;
mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::error::{ActionError, PluginError};
use crate::planner::ChangeSet;
use crate::target::TargetIdentity;

pub use builtin::{BuiltinLoader, FilePlugin, FILE_HOOK};
pub use registry::{PluginLoader, PluginRegistry};

/// Result type for plugin hooks.
pub type PluginResult<T> = std::result::Result<T, PluginError>;

/// Opaque reference used to load a provider's plugin.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HookRef(String);

impl HookRef {
    /// Creates a hook reference.
    #[must_use]
    pub fn new(hook: impl Into<String>) -> Self {
        Self(hook.into())
    }

    /// Returns the raw reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HookRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A provider as referenced by the deploy script: its name and how to load it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderRef {
    /// Provider name, the key of its record in the target store.
    pub name: String,
    /// Loader reference for the provider's plugin.
    pub hook: HookRef,
}

impl ProviderRef {
    /// Creates a provider reference.
    #[must_use]
    pub fn new(name: impl Into<String>, hook: HookRef) -> Self {
        Self {
            name: name.into(),
            hook,
        }
    }
}

/// Deferred operation that undoes one completed action.
///
/// Wraps a future that has not been polled yet; nothing runs until
/// [`RevertFn::run`] is awaited.
pub struct RevertFn {
    future: Pin<Box<dyn Future<Output = PluginResult<()>> + Send>>,
}

impl RevertFn {
    /// Wraps the given future as a revert.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = PluginResult<()>> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
        }
    }

    /// Runs the revert.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if undoing the action failed.
    pub async fn run(self) -> PluginResult<()> {
        self.future.await
    }
}

impl fmt::Debug for RevertFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RevertFn")
    }
}

/// The plugin hooks the engine calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookAction {
    /// Loading the plugin through its hook reference.
    Load,
    /// Refreshing a target from live infrastructure.
    Pull,
    /// Projecting identity fields.
    Identify,
    /// Creating a resource.
    Spawn,
    /// Updating a resource in place.
    Update,
    /// Destroying a resource.
    Kill,
    /// Undoing a previous action.
    Revert,
}

impl fmt::Display for HookAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Load => "load",
            Self::Pull => "pull",
            Self::Identify => "identify",
            Self::Spawn => "spawn",
            Self::Update => "update",
            Self::Kill => "kill",
            Self::Revert => "revert",
        };
        write!(f, "{s}")
    }
}

/// Which provider and hook an action belongs to.
///
/// Built at each call site and attached to any failure, so error reports
/// always say what was running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionContext {
    /// Provider name.
    pub provider: String,
    /// Hook being called.
    pub action: HookAction,
    /// Identity of the target, once known.
    pub identity: Option<TargetIdentity>,
    /// Declaration index, for declared targets.
    pub index: Option<u64>,
}

impl ActionContext {
    /// Creates a context for a provider hook.
    #[must_use]
    pub fn new(provider: impl Into<String>, action: HookAction) -> Self {
        Self {
            provider: provider.into(),
            action,
            identity: None,
            index: None,
        }
    }

    /// Attaches the target identity.
    #[must_use]
    pub fn with_identity(mut self, identity: &TargetIdentity) -> Self {
        self.identity = Some(identity.clone());
        self
    }

    /// Attaches the declaration index.
    #[must_use]
    pub const fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    /// Returns a copy of this context for another hook.
    #[must_use]
    pub fn for_action(&self, action: HookAction) -> Self {
        Self {
            action,
            ..self.clone()
        }
    }

    /// Tags a plugin error with this context.
    #[must_use]
    pub fn fail(&self, source: PluginError) -> ActionError {
        ActionError {
            context: self.clone(),
            source,
        }
    }
}

impl fmt::Display for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on provider '{}'", self.action, self.provider)?;
        match (&self.identity, self.index) {
            (Some(identity), _) => write!(f, " (target {})", identity.short()),
            (None, Some(index)) => write!(f, " (declaration #{index})"),
            (None, None) => Ok(()),
        }
    }
}

/// Capability object implemented by every provider.
///
/// One instance exists per hook reference for the duration of a run. Plugins
/// hold no reconciliation state; everything they need is in the target.
#[async_trait]
pub trait DeployPlugin: Send + Sync {
    /// Provider implementation name, for logs.
    fn name(&self) -> &str;

    /// Projects the fields that identify the resource across runs.
    async fn identify(&self, target: &Value) -> PluginResult<Value>;

    /// Refreshes target fields from live infrastructure before diffing.
    ///
    /// Returned object fields overwrite the declared ones.
    async fn pull(&self, _target: &Value) -> PluginResult<Option<Value>> {
        Ok(None)
    }

    /// Creates the resource.
    async fn spawn(&self, target: &Value) -> PluginResult<Option<RevertFn>>;

    /// Whether [`DeployPlugin::update`] is implemented.
    ///
    /// When false the engine replaces the resource with `kill` then `spawn`.
    fn supports_update(&self) -> bool {
        false
    }

    /// Updates an existing resource; `changes` lists the differing fields.
    async fn update(&self, _target: &Value, _changes: &ChangeSet) -> PluginResult<Option<RevertFn>> {
        Err(PluginError::Unsupported {
            action: HookAction::Update,
        })
    }

    /// Destroys a resource that is no longer declared.
    async fn kill(&self, target: &Value) -> PluginResult<Option<RevertFn>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_revert_is_lazy() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let revert = RevertFn::new(async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<(), PluginError>(())
        });

        assert!(!ran.load(Ordering::SeqCst));
        revert.run().await.expect("revert failed");
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_context_display() {
        let ctx = ActionContext::new("web", HookAction::Pull).with_index(3);
        assert_eq!(ctx.to_string(), "pull on provider 'web' (declaration #3)");
        assert_eq!(ctx.for_action(HookAction::Kill).action, HookAction::Kill);
    }
}
