//! Reconciler driving one deployment run.
//!
//! A run evaluates the deploy script once. Every declared target is applied
//! in declaration order: refreshed with `pull`, identified, matched against
//! the prior snapshot, diffed, and then spawned or updated. Once the script
//! is done, prior targets nobody declared are killed. The new snapshot is
//! committed only if all of that succeeded; otherwise every completed action
//! is reverted, newest first.
//!
//! Plugin actions are never abandoned halfway. A script failure or a cancel
//! signal is only observed while the run waits for a declaration or for a
//! target to resolve, so every action that started has either failed or
//! left its revert on the stack.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{DeclareError, DeployError, ReconcileError, Result, StateError};
use crate::planner::{ActionKind, ChangeSet, DiffEngine, PlannedAction, RevertStack, RunWarning};
use crate::plugin::{
    ActionContext, DeployPlugin, HookAction, HookRef, PluginLoader, PluginRegistry, ProviderRef,
    RevertFn,
};
use crate::queue::{self, DeclarationQueue};
use crate::script::{DeployScript, NoSecrets, SecretsLoader};
use crate::state::{LOCK_REFRESH_SECS, TargetSnapshot, TargetStore, generate_holder_id};
use crate::target::{ResolvedTarget, TargetIdentity, merge_pulled};

/// Reconciler for one target store.
pub struct Reconciler<'a, S: TargetStore> {
    /// Target store.
    store: &'a S,
    /// Loader for provider plugins.
    loader: Arc<dyn PluginLoader>,
    /// Secrets loaded before the first target.
    secrets: Arc<dyn SecretsLoader>,
    /// Diff engine.
    diff_engine: DiffEngine,
    /// Whether actions are only computed.
    dry_run: bool,
    /// Where dry runs write the snapshot they would commit.
    dry_run_output: Option<PathBuf>,
    /// Name recorded in the run lock.
    lock_holder: String,
    /// Interval between lock refreshes while a run is going.
    lock_refresh: Duration,
}

/// Lifecycle of a run, logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Acquiring the lock and loading the prior snapshot.
    Loading,
    /// The script is running; nothing applied yet.
    Declaring,
    /// Declared targets are being applied.
    Applying,
    /// Every declaration has been applied.
    AwaitingCompletion,
    /// Killing prior targets that were not declared.
    Killing,
    /// Committing the new snapshot.
    Persisting,
    /// Reverting completed actions after a failure.
    RollingBack,
    /// The run is over.
    Done,
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Nothing to spawn, update or kill; the store was not written.
    NoAction,
    /// The new snapshot was committed, after applying its actions if any.
    Applied,
    /// Actions were computed but not applied.
    DryRun,
}

/// Result of a successful run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Actions in execution order.
    pub actions: Vec<PlannedAction>,
    /// Number of declared targets that needed no action.
    pub unchanged: usize,
    /// Non-fatal conditions noticed during the run.
    pub warnings: Vec<RunWarning>,
    /// Snapshot committed (or, for dry runs, that would have been).
    #[serde(skip)]
    pub snapshot: TargetSnapshot,
    /// File the dry-run snapshot was written to.
    pub dry_run_output: Option<PathBuf>,
}

/// Mutable state of one run, owned by the apply loop.
struct Run {
    registry: PluginRegistry,
    priors: BTreeMap<String, ProviderPriors>,
    prepared: bool,
    reverts: RevertStack,
    actions: Vec<PlannedAction>,
    warnings: Vec<RunWarning>,
    /// Completed actions whose plugin returned no revert.
    unrecoverable: Vec<String>,
    declared: HashSet<(String, TargetIdentity)>,
    next: TargetSnapshot,
    unchanged: usize,
}

/// Prior targets of one provider.
struct ProviderPriors {
    hook: HookRef,
    targets: Vec<PriorTarget>,
}

struct PriorTarget {
    value: Value,
    /// Computed when the provider is first declared in this run.
    identity: Option<TargetIdentity>,
    reused: bool,
}

impl<'a, S: TargetStore> Reconciler<'a, S> {
    /// Creates a reconciler applying through plugins from `loader`.
    #[must_use]
    pub fn new(store: &'a S, loader: Arc<dyn PluginLoader>) -> Self {
        Self {
            store,
            loader,
            secrets: Arc::new(NoSecrets),
            diff_engine: DiffEngine::new(),
            dry_run: false,
            dry_run_output: None,
            lock_holder: generate_holder_id(),
            lock_refresh: Duration::from_secs(LOCK_REFRESH_SECS),
        }
    }

    /// Only computes actions; no plugin action is called and the store is
    /// neither locked nor written.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the file dry runs write their would-be snapshot to.
    ///
    /// Defaults to the store's [`TargetStore::dry_run_path`].
    #[must_use]
    pub fn with_dry_run_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.dry_run_output = Some(path.into());
        self
    }

    /// Sets the secrets loader.
    #[must_use]
    pub fn with_secrets(mut self, secrets: Arc<dyn SecretsLoader>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Sets the name recorded in the run lock.
    #[must_use]
    pub fn with_lock_holder(mut self, holder: impl Into<String>) -> Self {
        self.lock_holder = holder.into();
        self
    }

    /// Sets how often the run lock is refreshed while a run is going.
    #[must_use]
    pub fn with_lock_refresh(mut self, interval: Duration) -> Self {
        self.lock_refresh = interval.max(Duration::from_millis(1));
        self
    }

    /// Returns true if this reconciler performs dry runs.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Runs `script` to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is locked or unreadable, or if the run
    /// failed; in the latter case completed actions have been reverted.
    pub async fn run<D: DeployScript>(&self, script: D) -> Result<RunReport> {
        self.run_until(script, std::future::pending()).await
    }

    /// Runs `script`, treating completion of `cancel` as a failure.
    ///
    /// # Errors
    ///
    /// Same as [`Reconciler::run`]; cancellation is reported as
    /// [`ReconcileError::Cancelled`] after rolling back.
    pub async fn run_until<D, C>(&self, script: D, cancel: C) -> Result<RunReport>
    where
        D: DeployScript,
        C: Future<Output = ()> + Send,
    {
        enter(RunPhase::Loading);
        if self.dry_run {
            return self.run_unlocked(script, cancel).await;
        }

        let lock = self.store.acquire_lock(&self.lock_holder).await?;
        let result = tokio::select! {
            biased;
            result = self.run_unlocked(script, cancel) => result,
            () = self.keep_lock(&lock.lock_id) => {
                Err(DeployError::internal("lock refresh stopped"))
            }
        };
        if let Err(e) = self.store.release_lock(&lock.lock_id).await {
            warn!("Failed to release state lock {}: {e}", lock.lock_id);
        }
        result
    }

    async fn run_unlocked<D, C>(&self, script: D, cancel: C) -> Result<RunReport>
    where
        D: DeployScript,
        C: Future<Output = ()> + Send,
    {
        let snapshot = self.store.load().await?;
        info!(
            "Loaded {} prior target(s) across {} provider(s) from {} store",
            snapshot.target_count(),
            snapshot.providers.len(),
            self.store.backend_type()
        );

        let providers = script.providers();
        let mut run = Run::new(Arc::clone(&self.loader), snapshot);
        let (declarer, queue) = queue::channel();
        let reporter = declarer.clone();
        let script = async move {
            if let Err(e) = script.run(declarer).await {
                reporter.fail(e);
            }
        };

        tokio::pin!(cancel);
        let mut interrupt = Interrupt::new(cancel);

        enter(RunPhase::Declaring);
        let work = async {
            self.apply_declarations(&mut run, queue, &providers, &mut interrupt)
                .await?;
            self.kill_undeclared(&mut run, &providers, &mut interrupt)
                .await?;
            interrupt.check().await
        };

        match alongside(script, work).await {
            Ok(()) => self.finish(run).await,
            Err(e) => Err(self.roll_back(run, e).await),
        }
    }

    /// Refreshes the run lock until dropped. Failures are only logged.
    async fn keep_lock(&self, lock_id: &str) {
        let mut ticker = tokio::time::interval(self.lock_refresh);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = self.store.refresh_lock(lock_id).await {
                warn!("Failed to refresh state lock {lock_id}: {e}");
            }
        }
    }

    /// Applies declarations in index order until the script is done.
    async fn apply_declarations(
        &self,
        run: &mut Run,
        mut queue: DeclarationQueue,
        providers: &[ProviderRef],
        interrupt: &mut Interrupt<'_>,
    ) -> Result<()> {
        while let Some(declaration) = interrupt.guard(queue.next()).await? {
            if !run.prepared {
                self.prepare(run, providers).await?;
                enter(RunPhase::Applying);
            }
            let index = declaration.index;
            let provider = declaration.provider.clone();
            let target = interrupt.guard(declaration.resolve()).await?;
            self.apply_target(run, index, provider, target).await?;
        }

        enter(RunPhase::AwaitingCompletion);
        debug!("All {} declaration(s) applied", queue.dispatched());
        Ok(())
    }

    /// Loads secrets and every provider used by the script, once per run.
    async fn prepare(&self, run: &mut Run, providers: &[ProviderRef]) -> Result<()> {
        run.prepared = true;
        self.secrets.load().await?;
        run.registry.preload(providers).await?;
        debug!("Loaded {} plugin(s)", run.registry.loaded_count().await);
        Ok(())
    }

    async fn apply_target(
        &self,
        run: &mut Run,
        index: u64,
        provider: ProviderRef,
        mut target: Value,
    ) -> Result<()> {
        if !target.is_object() {
            return Err(DeclareError::NotAnObject {
                index,
                provider: provider.name,
            }
            .into());
        }

        let context = ActionContext::new(&provider.name, HookAction::Load).with_index(index);
        let plugin = run
            .registry
            .get(&provider.hook)
            .await
            .map_err(|e| context.fail(e))?;

        if let Some(pulled) = plugin
            .pull(&target)
            .await
            .map_err(|e| context.for_action(HookAction::Pull).fail(e))?
        {
            merge_pulled(&mut target, pulled);
        }
        let fields = plugin
            .identify(&target)
            .await
            .map_err(|e| context.for_action(HookAction::Identify).fail(e))?;

        let resolved = ResolvedTarget::new(provider, index, TargetIdentity::of(&fields), target);
        let context = context.with_identity(&resolved.identity);
        run.record_declared(&resolved);

        match run.claim_prior(&resolved, plugin.as_ref()).await? {
            None => self.spawn(run, plugin.as_ref(), &resolved, &context).await,
            Some(prior) => {
                let diff = self.diff_engine.diff(&prior, &resolved.target);
                if diff.changed {
                    self.update(run, plugin.as_ref(), &resolved, &prior, &diff.changes, &context)
                        .await
                } else {
                    debug!(
                        "Target {} on '{}' is unchanged",
                        resolved.identity.short(),
                        resolved.provider.name
                    );
                    run.unchanged += 1;
                    Ok(())
                }
            }
        }
    }

    async fn spawn(
        &self,
        run: &mut Run,
        plugin: &dyn DeployPlugin,
        resolved: &ResolvedTarget,
        context: &ActionContext,
    ) -> Result<()> {
        let provider = &resolved.provider.name;
        run.actions
            .push(PlannedAction::spawn(provider, &resolved.identity, resolved.index));
        if self.dry_run {
            info!("Would spawn {} on '{provider}'", resolved.identity.short());
            return Ok(());
        }

        info!("Spawning {} on '{provider}'", resolved.identity.short());
        let context = context.for_action(HookAction::Spawn);
        let revert = plugin
            .spawn(&resolved.target)
            .await
            .map_err(|e| context.fail(e))?;
        run.push_revert(context, &resolved.identity, revert);
        Ok(())
    }

    async fn update(
        &self,
        run: &mut Run,
        plugin: &dyn DeployPlugin,
        resolved: &ResolvedTarget,
        prior: &Value,
        changes: &ChangeSet,
        context: &ActionContext,
    ) -> Result<()> {
        let provider = &resolved.provider.name;
        let paths = changes.paths();
        run.actions.push(PlannedAction::update(
            provider,
            &resolved.identity,
            resolved.index,
            paths.clone(),
        ));
        if self.dry_run {
            info!(
                "Would update {} on '{provider}' ({})",
                resolved.identity.short(),
                paths.join(", ")
            );
            return Ok(());
        }

        info!(
            "Updating {} on '{provider}' ({})",
            resolved.identity.short(),
            paths.join(", ")
        );
        if plugin.supports_update() {
            let context = context.for_action(HookAction::Update);
            let revert = plugin
                .update(&resolved.target, changes)
                .await
                .map_err(|e| context.fail(e))?;
            run.push_revert(context, &resolved.identity, revert);
        } else {
            debug!("Provider '{provider}' cannot update in place, replacing");
            let kill = context.for_action(HookAction::Kill);
            let revert = plugin.kill(prior).await.map_err(|e| kill.fail(e))?;
            run.push_revert(kill, &resolved.identity, revert);

            let spawn = context.for_action(HookAction::Spawn);
            let revert = plugin
                .spawn(&resolved.target)
                .await
                .map_err(|e| spawn.fail(e))?;
            run.push_revert(spawn, &resolved.identity, revert);
        }
        Ok(())
    }

    /// Kills every prior target no declaration claimed.
    async fn kill_undeclared(
        &self,
        run: &mut Run,
        providers: &[ProviderRef],
        interrupt: &mut Interrupt<'_>,
    ) -> Result<()> {
        enter(RunPhase::Killing);
        let doomed = run.take_unclaimed();
        if doomed.is_empty() {
            debug!("No undeclared targets to kill");
            return Ok(());
        }
        if !run.prepared {
            self.prepare(run, providers).await?;
        }

        for (provider, prior) in doomed {
            interrupt.check().await?;
            let context = ActionContext::new(&provider.name, HookAction::Load);
            let plugin = run
                .registry
                .get(&provider.hook)
                .await
                .map_err(|e| context.fail(e))?;

            let identity = match prior.identity {
                Some(identity) => identity,
                None => TargetIdentity::of(
                    &plugin
                        .identify(&prior.value)
                        .await
                        .map_err(|e| context.for_action(HookAction::Identify).fail(e))?,
                ),
            };

            run.actions.push(PlannedAction::kill(&provider.name, &identity));
            if self.dry_run {
                info!("Would kill {} on '{}'", identity.short(), provider.name);
                continue;
            }

            info!("Killing {} on '{}' (no longer declared)", identity.short(), provider.name);
            let context = context.with_identity(&identity).for_action(HookAction::Kill);
            let revert = plugin
                .kill(&prior.value)
                .await
                .map_err(|e| context.fail(e))?;
            run.push_revert(context, &identity, revert);
        }
        Ok(())
    }

    async fn finish(&self, mut run: Run) -> Result<RunReport> {
        let mut dry_run_output = None;
        let rehooked = run.rehooked();
        let outcome = if run.actions.is_empty() && rehooked.is_empty() {
            info!("No changes required - targets are converged");
            RunOutcome::NoAction
        } else if self.dry_run {
            run.next.touch();
            match self.dry_run_output.clone().or_else(|| self.store.dry_run_path()) {
                Some(path) => {
                    write_dry_run(&path, &run.next).await?;
                    dry_run_output = Some(path);
                }
                None => info!(
                    "Dry run: {} store has no local home, would-be state not written",
                    self.store.backend_type()
                ),
            }
            RunOutcome::DryRun
        } else {
            for name in &rehooked {
                info!("Recording new hook for provider '{name}'");
            }
            enter(RunPhase::Persisting);
            run.next.touch();
            self.store.save(&run.next).await.map_err(|e| {
                error!("Every action succeeded but the state could not be saved: {e}");
                DeployError::StateNotSaved {
                    source: Box::new(e),
                }
            })?;
            RunOutcome::Applied
        };
        enter(RunPhase::Done);

        let report = RunReport {
            outcome,
            dry_run: self.dry_run,
            actions: run.actions,
            unchanged: run.unchanged,
            warnings: run.warnings,
            snapshot: run.next,
            dry_run_output,
        };
        info!("{report}");
        Ok(report)
    }

    async fn roll_back(&self, run: Run, error: DeployError) -> DeployError {
        if self.dry_run {
            warn!("Dry run failed, nothing was applied: {error}");
            return error;
        }

        enter(RunPhase::RollingBack);
        error!("Apply failed: {error}");
        let mut rollback = run.reverts.unwind().await;
        rollback.unrecoverable = run.unrecoverable;
        if rollback.is_complete() {
            info!("Rollback finished: {rollback}");
        } else {
            error!("Rollback incomplete: {rollback}");
        }
        enter(RunPhase::Done);

        DeployError::Apply {
            source: Box::new(error),
            rollback,
        }
    }
}

impl<S: TargetStore> fmt::Debug for Reconciler<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("backend", &self.store.backend_type())
            .field("dry_run", &self.dry_run)
            .field("lock_holder", &self.lock_holder)
            .finish_non_exhaustive()
    }
}

impl Run {
    fn new(loader: Arc<dyn PluginLoader>, snapshot: TargetSnapshot) -> Self {
        let priors = snapshot
            .providers
            .into_iter()
            .map(|(name, record)| {
                let targets = record
                    .targets
                    .into_iter()
                    .map(|value| PriorTarget {
                        value,
                        identity: None,
                        reused: false,
                    })
                    .collect();
                (
                    name,
                    ProviderPriors {
                        hook: record.hook,
                        targets,
                    },
                )
            })
            .collect();

        Self {
            registry: PluginRegistry::new(loader),
            priors,
            prepared: false,
            reverts: RevertStack::new(),
            actions: Vec::new(),
            warnings: Vec::new(),
            unrecoverable: Vec::new(),
            declared: HashSet::new(),
            next: TargetSnapshot::new(),
            unchanged: 0,
        }
    }

    /// Adds a declared target to the next snapshot.
    fn record_declared(&mut self, resolved: &ResolvedTarget) {
        self.next
            .push_target(&resolved.provider, resolved.target.clone());

        let key = (resolved.provider.name.clone(), resolved.identity.clone());
        if !self.declared.insert(key) {
            let warning = RunWarning::DuplicateIdentity {
                provider: resolved.provider.name.clone(),
                identity: resolved.identity.clone(),
                index: resolved.index,
            };
            warn!("{warning}");
            self.warnings.push(warning);
        }
    }

    /// Marks the first unreused prior with the same identity as reused and
    /// returns it.
    async fn claim_prior(
        &mut self,
        resolved: &ResolvedTarget,
        plugin: &dyn DeployPlugin,
    ) -> Result<Option<Value>> {
        let Some(priors) = self.priors.get_mut(&resolved.provider.name) else {
            return Ok(None);
        };

        for prior in priors.targets.iter_mut().filter(|p| p.identity.is_none()) {
            let fields = plugin.identify(&prior.value).await.map_err(|e| {
                ActionContext::new(&resolved.provider.name, HookAction::Identify).fail(e)
            })?;
            prior.identity = Some(TargetIdentity::of(&fields));
        }

        Ok(priors
            .targets
            .iter_mut()
            .find(|p| !p.reused && p.identity.as_ref() == Some(&resolved.identity))
            .map(|p| {
                p.reused = true;
                p.value.clone()
            }))
    }

    /// Declared providers whose hook differs from the stored one.
    fn rehooked(&self) -> Vec<String> {
        self.next
            .providers
            .iter()
            .filter(|(name, record)| {
                self.priors
                    .get(name.as_str())
                    .is_some_and(|prior| prior.hook != record.hook)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Removes and returns every unclaimed prior, in provider order.
    ///
    /// A provider declared in this run is killed through its declared hook.
    fn take_unclaimed(&mut self) -> Vec<(ProviderRef, PriorTarget)> {
        let mut doomed = Vec::new();
        for (name, priors) in &mut self.priors {
            let hook = self
                .next
                .record(name)
                .map_or_else(|| priors.hook.clone(), |record| record.hook.clone());
            let provider = ProviderRef::new(name.clone(), hook);
            for prior in std::mem::take(&mut priors.targets) {
                if !prior.reused {
                    doomed.push((provider.clone(), prior));
                }
            }
        }
        doomed
    }

    fn push_revert(
        &mut self,
        context: ActionContext,
        identity: &TargetIdentity,
        revert: Option<RevertFn>,
    ) {
        if let Some(revert) = revert {
            self.reverts.push(context, revert);
            return;
        }

        let warning = RunWarning::NoRevert {
            provider: context.provider.clone(),
            action: context.action,
            identity: identity.clone(),
        };
        warn!("{warning}");
        self.unrecoverable.push(context.to_string());
        self.warnings.push(warning);
    }
}

async fn write_dry_run(path: &Path, snapshot: &TargetSnapshot) -> Result<()> {
    let content = snapshot.to_pretty_json()?;
    let write_failed = |e: std::io::Error| {
        DeployError::State(StateError::WriteFailed {
            location: path.display().to_string(),
            message: e.to_string(),
        })
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }
    tokio::fs::write(path, content).await.map_err(write_failed)?;
    info!("Dry-run state written to: {}", path.display());
    Ok(())
}

fn enter(phase: RunPhase) {
    debug!("Run phase: {phase}");
}

/// Polls `script` alongside `work` until `work` is done.
///
/// `script` finishing early does not stop `work`; a script still running
/// when `work` ends is dropped.
async fn alongside<S, W>(script: S, work: W) -> Result<()>
where
    S: Future<Output = ()>,
    W: Future<Output = Result<()>>,
{
    tokio::pin!(script);
    tokio::pin!(work);
    let mut script_done = false;
    loop {
        tokio::select! {
            result = &mut work => return result,
            () = &mut script, if !script_done => script_done = true,
        }
    }
}

/// Cancel signal, observed only at explicit waiting points.
struct Interrupt<'c> {
    signal: Pin<&'c mut (dyn Future<Output = ()> + Send + 'c)>,
    fired: bool,
}

impl<'c> Interrupt<'c> {
    const fn new(signal: Pin<&'c mut (dyn Future<Output = ()> + Send + 'c)>) -> Self {
        Self {
            signal,
            fired: false,
        }
    }

    /// Awaits `wait` unless the signal fires first.
    async fn guard<T>(&mut self, wait: impl Future<Output = Result<T>>) -> Result<T> {
        if self.fired {
            return Err(cancelled());
        }
        tokio::select! {
            biased;
            () = self.signal.as_mut() => {
                self.fired = true;
                Err(cancelled())
            }
            result = wait => result,
        }
    }

    /// Fails if the signal has fired.
    async fn check(&mut self) -> Result<()> {
        self.guard(async { Ok(()) }).await
    }
}

fn cancelled() -> DeployError {
    ReconcileError::Cancelled {
        reason: String::from("cancel signal received"),
    }
    .into()
}

impl RunReport {
    /// Number of actions of the given kind.
    #[must_use]
    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    /// Returns true if any action was (or would be) taken.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.actions.is_empty()
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Loading => "loading",
            Self::Declaring => "declaring",
            Self::Applying => "applying",
            Self::AwaitingCompletion => "awaiting completion",
            Self::Killing => "killing",
            Self::Persisting => "persisting",
            Self::RollingBack => "rolling back",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoAction => "No changes",
            Self::Applied => "Applied",
            Self::DryRun => "Dry run",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} spawned, {} updated, {} killed, {} unchanged",
            self.outcome,
            self.count(ActionKind::Spawn),
            self.count(ActionKind::Update),
            self.count(ActionKind::Kill),
            self.unchanged
        )?;
        if !self.warnings.is_empty() {
            write!(f, " ({} warning(s))", self.warnings.len())?;
        }
        Ok(())
    }
}
