//! Lazy, memoized plugin loading.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::ActionError;

use super::{ActionContext, DeployPlugin, HookAction, HookRef, PluginResult, ProviderRef};

/// Resolves a hook reference to a plugin instance.
#[async_trait]
pub trait PluginLoader: Send + Sync {
    /// Loads the plugin behind `hook`.
    async fn load(&self, hook: &HookRef) -> PluginResult<Arc<dyn DeployPlugin>>;
}

/// Per-run cache of loaded plugins, keyed by hook reference.
pub struct PluginRegistry {
    /// Loader used on cache misses.
    loader: Arc<dyn PluginLoader>,
    /// Plugins loaded so far.
    loaded: Mutex<HashMap<HookRef, Arc<dyn DeployPlugin>>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(loader: Arc<dyn PluginLoader>) -> Self {
        Self {
            loader,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the plugin for `hook`, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the loader cannot resolve the hook.
    pub async fn get(&self, hook: &HookRef) -> PluginResult<Arc<dyn DeployPlugin>> {
        // Held across the load so two callers never load the same hook twice.
        let mut loaded = self.loaded.lock().await;
        if let Some(plugin) = loaded.get(hook) {
            return Ok(Arc::clone(plugin));
        }

        debug!("Loading plugin: {hook}");
        let plugin = self.loader.load(hook).await?;
        info!("Loaded plugin '{}' for hook {hook}", plugin.name());
        loaded.insert(hook.clone(), Arc::clone(&plugin));
        Ok(plugin)
    }

    /// Loads the plugin of every given provider.
    ///
    /// # Errors
    ///
    /// Returns the first loading error, tagged with its provider.
    pub async fn preload(&self, providers: &[ProviderRef]) -> Result<(), ActionError> {
        for provider in providers {
            self.get(&provider.hook)
                .await
                .map_err(|e| ActionContext::new(&provider.name, HookAction::Load).fail(e))?;
        }
        Ok(())
    }

    /// Returns how many distinct plugins have been loaded.
    pub async fn loaded_count(&self) -> usize {
        self.loaded.lock().await.len()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Journal, RecordingLoader};

    #[tokio::test]
    async fn test_plugins_are_memoized_per_hook() {
        let journal = Journal::default();
        let loader = Arc::new(RecordingLoader::new(journal.clone()));
        let registry = PluginRegistry::new(loader.clone());

        let web = ProviderRef::new("web", HookRef::new("test:web"));
        let dns = ProviderRef::new("dns", HookRef::new("test:dns"));

        registry
            .preload(&[web.clone(), dns, web.clone()])
            .await
            .expect("preload failed");
        registry.get(&web.hook).await.expect("get failed");

        assert_eq!(registry.loaded_count().await, 2);
        assert_eq!(loader.load_count(), 2);
    }
}
