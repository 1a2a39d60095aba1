//! Test fixtures: a recording plugin, its loader, and a scripted deploy script.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{PluginError, Result};
use crate::planner::ChangeSet;
use crate::plugin::{DeployPlugin, HookRef, PluginLoader, PluginResult, ProviderRef, RevertFn};
use crate::queue::Declarer;
use crate::script::DeployScript;

/// Shared, ordered log of plugin calls.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().expect("journal poisoned").push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("journal poisoned").clone()
    }

    pub fn clear(&self) {
        self.0.lock().expect("journal poisoned").clear();
    }
}

/// Plugin logging every call as `<hook>:<plugin>:<name>`.
///
/// Targets are identified by their `name` field.
#[derive(Debug)]
pub struct RecordingPlugin {
    name: String,
    journal: Journal,
    actions: AtomicUsize,
    fail_at: Option<usize>,
    failing_revert: Option<String>,
    updates: bool,
    reverts: bool,
    pulled: Option<Value>,
    latency: Duration,
}

impl RecordingPlugin {
    pub fn new(name: &str, journal: Journal) -> Self {
        Self {
            name: name.to_string(),
            journal,
            actions: AtomicUsize::new(0),
            fail_at: None,
            failing_revert: None,
            updates: false,
            reverts: true,
            pulled: None,
            latency: Duration::ZERO,
        }
    }

    /// Fails the `n`th spawn, update or kill (zero-based).
    pub fn fail_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    /// Makes the revert of the target called `name` fail.
    pub fn failing_revert(mut self, name: &str) -> Self {
        self.failing_revert = Some(name.to_string());
        self
    }

    pub fn with_updates(mut self) -> Self {
        self.updates = true;
        self
    }

    pub fn without_reverts(mut self) -> Self {
        self.reverts = false;
        self
    }

    /// Fields returned by every `pull`.
    pub fn with_pull(mut self, fields: Value) -> Self {
        self.pulled = Some(fields);
        self
    }

    /// Makes every spawn, update and kill take `ms` after its side effect
    /// is journaled.
    pub fn slow(mut self, ms: u64) -> Self {
        self.latency = Duration::from_millis(ms);
        self
    }

    async fn act(&self, hook: &str, target: &Value) -> PluginResult<Option<RevertFn>> {
        let name = target_name(target);
        let n = self.actions.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(n) {
            self.journal.record(format!("fail-{hook}:{}:{name}", self.name));
            return Err(PluginError::failed(format!("{hook} of {name} failed")));
        }
        self.journal.record(format!("{hook}:{}:{name}", self.name));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if !self.reverts {
            return Ok(None);
        }
        let journal = self.journal.clone();
        let entry = format!("revert-{hook}:{}:{name}", self.name);
        let fails = self.failing_revert.as_deref() == Some(name.as_str());
        Ok(Some(RevertFn::new(async move {
            journal.record(entry);
            if fails {
                return Err(PluginError::failed("revert refused"));
            }
            Ok::<(), PluginError>(())
        })))
    }
}

fn target_name(target: &Value) -> String {
    target
        .get("name")
        .map_or_else(|| String::from("?"), |n| n.as_str().map_or_else(|| n.to_string(), str::to_string))
}

#[async_trait]
impl DeployPlugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn identify(&self, target: &Value) -> PluginResult<Value> {
        target
            .get("name")
            .map(|name| serde_json::json!({ "name": name }))
            .ok_or_else(|| PluginError::invalid_target("missing name"))
    }

    async fn pull(&self, target: &Value) -> PluginResult<Option<Value>> {
        if self.pulled.is_some() {
            self.journal
                .record(format!("pull:{}:{}", self.name, target_name(target)));
        }
        Ok(self.pulled.clone())
    }

    async fn spawn(&self, target: &Value) -> PluginResult<Option<RevertFn>> {
        self.act("spawn", target).await
    }

    fn supports_update(&self) -> bool {
        self.updates
    }

    async fn update(&self, target: &Value, _changes: &ChangeSet) -> PluginResult<Option<RevertFn>> {
        self.act("update", target).await
    }

    async fn kill(&self, target: &Value) -> PluginResult<Option<RevertFn>> {
        self.act("kill", target).await
    }
}

/// Loader resolving `test:<name>` hooks to recording plugins.
#[derive(Debug)]
pub struct RecordingLoader {
    journal: Journal,
    plugins: Mutex<HashMap<HookRef, Arc<RecordingPlugin>>>,
    loads: AtomicUsize,
}

impl RecordingLoader {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            plugins: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Serves `plugin` for `hook` instead of a default one.
    pub fn with_plugin(self, hook: &str, plugin: RecordingPlugin) -> Self {
        self.plugins
            .lock()
            .expect("loader poisoned")
            .insert(HookRef::new(hook), Arc::new(plugin));
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginLoader for RecordingLoader {
    async fn load(&self, hook: &HookRef) -> PluginResult<Arc<dyn DeployPlugin>> {
        let Some(name) = hook.as_str().strip_prefix("test:") else {
            return Err(PluginError::Load {
                hook: hook.to_string(),
                message: String::from("not a test hook"),
            });
        };
        self.loads.fetch_add(1, Ordering::SeqCst);

        let mut plugins = self.plugins.lock().expect("loader poisoned");
        let plugin = plugins
            .entry(hook.clone())
            .or_insert_with(|| Arc::new(RecordingPlugin::new(name, self.journal.clone())));
        let plugin: Arc<dyn DeployPlugin> = plugin.clone();
        Ok(plugin)
    }
}

/// Returns a provider named `name` with hook `test:<name>`.
pub fn provider(name: &str) -> ProviderRef {
    ProviderRef::new(name, HookRef::new(format!("test:{name}")))
}

/// Deploy script declaring a fixed list of targets.
///
/// Each target resolves after its delay, so later targets may resolve first.
#[derive(Debug, Clone, Default)]
pub struct VecScript {
    providers: Vec<ProviderRef>,
    targets: Vec<(ProviderRef, Value, u64)>,
    fail_after: Option<usize>,
}

impl VecScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(self, provider_name: &str, target: Value) -> Self {
        self.delayed(provider_name, target, 0)
    }

    pub fn delayed(self, provider_name: &str, target: Value, delay_ms: u64) -> Self {
        self.through(provider(provider_name), target, delay_ms)
    }

    /// Declares `target` for an explicitly given provider.
    pub fn through(mut self, provider: ProviderRef, target: Value, delay_ms: u64) -> Self {
        if !self.providers.contains(&provider) {
            self.providers.push(provider.clone());
        }
        self.targets.push((provider, target, delay_ms));
        self
    }

    /// Makes the script fail after declaring `n` targets.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }
}

#[async_trait]
impl DeployScript for VecScript {
    fn providers(&self) -> Vec<ProviderRef> {
        self.providers.clone()
    }

    async fn run(self, declarer: Declarer) -> Result<()> {
        for (n, (provider, target, delay_ms)) in self.targets.into_iter().enumerate() {
            if self.fail_after == Some(n) {
                return Err(crate::error::DeployError::internal("script failed"));
            }
            declarer.declare(provider, async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(target)
            })?;
        }
        Ok(())
    }
}
