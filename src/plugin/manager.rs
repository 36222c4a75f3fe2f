//! Plugin host: attach, initialize, dispatch hooks, clean up.
//!
//! Attach order is always a valid topological order, because a plugin can
//! only be attached once its dependencies are. Initialization and dispatch
//! therefore walk the attach list front to back and cleanup walks it back
//! to front.
//!
//! Every call into a plugin is isolated: an `Err`, a panic, a timeout or a
//! cancellation is recorded against that plugin and the walk continues.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{AuthPlugin, Hook, HookPayload, PluginMetadata, PluginState};
use crate::auth::AuthService;
use crate::cancellation::CancellationToken;
use crate::config::PluginManagerConfig;
use crate::error::{PluginError, PluginResult};

struct PluginEntry {
    plugin: Arc<dyn AuthPlugin>,
    metadata: PluginMetadata,
    state: PluginState,
}

type Candidate = (Arc<dyn AuthPlugin>, PluginMetadata);

enum Claim {
    Claimed(Arc<dyn AuthPlugin>),
    DependencyFailed(String),
    Skip,
}

/// Registry and lifecycle driver for [`AuthPlugin`]s.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use warden_di::{
///     AnalyticsConfig, AnalyticsPlugin, AuthPlugin, PluginManager, SecurityConfig, SecurityPlugin,
/// };
///
/// let manager = PluginManager::new();
/// let report = manager.attach_all([
///     Arc::new(SecurityPlugin::new(SecurityConfig::default())) as Arc<dyn AuthPlugin>,
///     Arc::new(AnalyticsPlugin::new(AnalyticsConfig::default())) as Arc<dyn AuthPlugin>,
/// ]);
///
/// assert!(report.is_ok());
/// assert_eq!(manager.names(), ["security", "analytics"]);
/// ```
pub struct PluginManager {
    config: PluginManagerConfig,
    entries: Mutex<Vec<PluginEntry>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::with_config(PluginManagerConfig::default())
    }

    pub fn with_config(config: PluginManagerConfig) -> Self {
        Self { config, entries: Mutex::new(Vec::new()) }
    }

    pub fn config(&self) -> &PluginManagerConfig {
        &self.config
    }

    /// Attaches one plugin whose dependencies are all attached already.
    ///
    /// # Errors
    ///
    /// [`PluginError::DuplicateName`], [`PluginError::MissingDependency`] or
    /// [`PluginError::CircularDependency`] for a plugin listing itself.
    pub fn attach(&self, plugin: Arc<dyn AuthPlugin>) -> PluginResult<()> {
        let metadata = plugin.metadata();
        let mut entries = self.entries.lock();

        if entries.iter().any(|e| e.metadata.name == metadata.name) {
            return Err(PluginError::DuplicateName { plugin: metadata.name });
        }
        if metadata.dependencies.contains(&metadata.name) {
            return Err(PluginError::CircularDependency {
                cycle: vec![metadata.name.clone(), metadata.name.clone()],
                plugin: metadata.name,
            });
        }
        if let Some(dependency) = metadata
            .dependencies
            .iter()
            .find(|dep| !entries.iter().any(|e| &e.metadata.name == *dep))
        {
            return Err(PluginError::MissingDependency {
                dependency: dependency.clone(),
                plugin: metadata.name,
            });
        }

        info!(plugin = %metadata.name, version = %metadata.version, "plugin attached");
        entries.push(PluginEntry { plugin, metadata, state: PluginState::Attached });
        Ok(())
    }

    /// Attaches a batch in dependency order.
    ///
    /// Dependencies may be satisfied by plugins already attached or by other
    /// members of the batch. Among plugins whose dependencies are satisfied,
    /// input order wins. Duplicates, plugins with missing or cyclic
    /// dependencies, and everything depending on them are rejected; the rest
    /// are attached.
    pub fn attach_all<I>(&self, plugins: I) -> AttachReport
    where
        I: IntoIterator<Item = Arc<dyn AuthPlugin>>,
    {
        let mut report = AttachReport::default();
        let mut entries = self.entries.lock();
        let attached: HashSet<String> = entries.iter().map(|e| e.metadata.name.clone()).collect();

        let mut seen = HashSet::new();
        let mut pending: Vec<Candidate> = Vec::new();
        for plugin in plugins {
            let metadata = plugin.metadata();
            if attached.contains(&metadata.name) || !seen.insert(metadata.name.clone()) {
                report.rejected.push(PluginError::DuplicateName { plugin: metadata.name });
            } else {
                pending.push((plugin, metadata));
            }
        }

        // Rejections cascade: dropping one plugin can orphan its dependents.
        while let Some((index, dependency)) = first_unsatisfied(&pending, &attached) {
            let (_, metadata) = pending.remove(index);
            report
                .rejected
                .push(PluginError::MissingDependency { plugin: metadata.name, dependency });
        }

        let mut placed = attached;
        let mut ordered = Vec::with_capacity(pending.len());
        while let Some(index) = pending
            .iter()
            .position(|(_, m)| m.dependencies.iter().all(|dep| placed.contains(dep)))
        {
            let candidate = pending.remove(index);
            placed.insert(candidate.1.name.clone());
            ordered.push(candidate);
        }

        // Whatever is left sits on, or behind, a cycle.
        for (_, metadata) in &pending {
            report.rejected.push(PluginError::CircularDependency {
                plugin: metadata.name.clone(),
                cycle: find_cycle(&pending, &metadata.name),
            });
        }

        for (plugin, metadata) in ordered {
            info!(plugin = %metadata.name, version = %metadata.version, "plugin attached");
            report.attached.push(metadata.name.clone());
            entries.push(PluginEntry { plugin, metadata, state: PluginState::Attached });
        }

        for rejection in &report.rejected {
            warn!(plugin = %rejection.plugin(), error = %rejection, "plugin rejected");
        }
        report
    }

    /// Initializes every attached plugin that has not been initialized yet.
    ///
    /// A plugin whose dependency is not active is marked
    /// [`PluginState::Failed`] without being called.
    pub async fn initialize(&self, auth: Arc<dyn AuthService>) -> InitReport {
        self.run_initialize(auth, None).await
    }

    pub async fn initialize_with_cancel(
        &self,
        auth: Arc<dyn AuthService>,
        cancel: &CancellationToken,
    ) -> InitReport {
        self.run_initialize(auth, Some(cancel)).await
    }

    async fn run_initialize(
        &self,
        auth: Arc<dyn AuthService>,
        cancel: Option<&CancellationToken>,
    ) -> InitReport {
        let mut report = InitReport::default();

        for name in self.names() {
            let plugin = match self.claim_for_initialization(&name) {
                Claim::Claimed(plugin) => plugin,
                Claim::Skip => continue,
                Claim::DependencyFailed(dependency) => {
                    warn!(
                        plugin = %name,
                        %dependency,
                        "dependency not active, skipping initialization"
                    );
                    report.results.push((
                        name.clone(),
                        Err(PluginError::DependencyFailed { plugin: name, dependency }),
                    ));
                    continue;
                }
            };

            debug!(plugin = %name, "initializing plugin");
            let outcome = guarded(
                &name,
                "initialize",
                self.config.init_timeout,
                cancel,
                plugin.initialize(Arc::clone(&auth)),
                |reason| PluginError::Initialization { plugin: name.clone(), reason },
            )
            .await;

            match &outcome {
                Ok(()) => {
                    self.set_state(&name, PluginState::Active);
                    info!(plugin = %name, "plugin initialized");
                }
                Err(error) => {
                    self.set_state(&name, PluginState::Failed);
                    warn!(plugin = %name, %error, "plugin failed to initialize");
                }
            }
            report.results.push((name, outcome));
        }

        report
    }

    fn claim_for_initialization(&self, name: &str) -> Claim {
        let mut entries = self.entries.lock();
        let Some(index) = entries.iter().position(|e| e.metadata.name == name) else {
            return Claim::Skip;
        };
        if entries[index].state != PluginState::Attached {
            return Claim::Skip;
        }

        let inactive = entries[index].metadata.dependencies.iter().find(|dep| {
            !entries
                .iter()
                .any(|e| &e.metadata.name == *dep && e.state.is_active())
        });
        if let Some(dependency) = inactive.cloned() {
            entries[index].state = PluginState::Failed;
            return Claim::DependencyFailed(dependency);
        }

        entries[index].state = PluginState::Initializing;
        Claim::Claimed(Arc::clone(&entries[index].plugin))
    }

    /// Dispatches `hook` to every active plugin subscribed to it, in attach
    /// order. Never fails as a whole; per-plugin outcomes are in the result.
    pub async fn execute(&self, hook: &Hook, payload: &HookPayload) -> HookResults {
        self.run_execute(hook, payload, None).await
    }

    pub async fn execute_with_cancel(
        &self,
        hook: &Hook,
        payload: &HookPayload,
        cancel: &CancellationToken,
    ) -> HookResults {
        self.run_execute(hook, payload, Some(cancel)).await
    }

    async fn run_execute(
        &self,
        hook: &Hook,
        payload: &HookPayload,
        cancel: Option<&CancellationToken>,
    ) -> HookResults {
        let targets: Vec<(String, Arc<dyn AuthPlugin>)> = self
            .entries
            .lock()
            .iter()
            .filter(|e| e.state.is_active() && e.metadata.hooks.contains(hook))
            .map(|e| (e.metadata.name.clone(), Arc::clone(&e.plugin)))
            .collect();

        let mut results =
            HookResults { hook: hook.clone(), results: Vec::with_capacity(targets.len()) };
        for (name, plugin) in targets {
            let outcome = guarded(
                &name,
                "execute",
                self.config.hook_timeout,
                cancel,
                plugin.execute(hook, payload),
                |reason| PluginError::Execution {
                    plugin: name.clone(),
                    hook: hook.to_string(),
                    reason,
                },
            )
            .await;

            if let Err(error) = &outcome {
                warn!(plugin = %name, %hook, %error, "plugin hook failed");
            }
            results.results.push((name, outcome));
        }

        debug!(%hook, invoked = results.len(), "hook dispatched");
        results
    }

    /// Cleans up every plugin, initialized or not, in reverse attach order
    /// and detaches them all. Failures are collected, never raised.
    pub async fn cleanup(&self) -> CleanupReport {
        let targets: Vec<(String, Arc<dyn AuthPlugin>)> = {
            let mut entries = self.entries.lock();
            for entry in entries.iter_mut() {
                entry.state = PluginState::CleaningUp;
            }
            entries
                .iter()
                .rev()
                .map(|e| (e.metadata.name.clone(), Arc::clone(&e.plugin)))
                .collect()
        };

        let mut report = CleanupReport::default();
        for (name, plugin) in &targets {
            let outcome = self.cleanup_one(name, plugin.as_ref()).await;
            if let Err(error) = outcome {
                report.errors.push(error);
            }
            report.detached.push(name.clone());
        }

        let detached: HashSet<&str> = targets.iter().map(|(name, _)| name.as_str()).collect();
        self.entries
            .lock()
            .retain(|e| !detached.contains(e.metadata.name.as_str()));

        info!(detached = report.detached.len(), failed = report.errors.len(), "plugins cleaned up");
        report
    }

    /// Cleans up and removes one plugin.
    ///
    /// The plugin is removed even when its cleanup fails; the failure is
    /// returned.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotFound`], [`PluginError::HasDependents`] while other
    /// attached plugins depend on it, or the cleanup failure.
    pub async fn detach(&self, name: &str) -> PluginResult<()> {
        let plugin = {
            let mut entries = self.entries.lock();
            let Some(index) = entries.iter().position(|e| e.metadata.name == name) else {
                return Err(PluginError::NotFound { plugin: name.to_string() });
            };
            let dependents: Vec<String> = entries
                .iter()
                .filter(|e| e.metadata.dependencies.iter().any(|dep| dep == name))
                .map(|e| e.metadata.name.clone())
                .collect();
            if !dependents.is_empty() {
                return Err(PluginError::HasDependents { plugin: name.to_string(), dependents });
            }
            entries[index].state = PluginState::CleaningUp;
            Arc::clone(&entries[index].plugin)
        };

        let outcome = self.cleanup_one(name, plugin.as_ref()).await;
        self.entries.lock().retain(|e| e.metadata.name != name);
        outcome
    }

    async fn cleanup_one(&self, name: &str, plugin: &dyn AuthPlugin) -> PluginResult<()> {
        let outcome = guarded(
            name,
            "cleanup",
            self.config.cleanup_timeout,
            None,
            plugin.cleanup(),
            |reason| PluginError::Cleanup { plugin: name.to_string(), reason },
        )
        .await;
        match &outcome {
            Ok(()) => info!(plugin = %name, "plugin detached"),
            Err(error) => warn!(plugin = %name, %error, "plugin cleanup failed"),
        }
        outcome
    }

    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.metadata.name == name)
            .map(|e| e.state)
    }

    pub fn plugin(&self, name: &str) -> Option<Arc<dyn AuthPlugin>> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.metadata.name == name)
            .map(|e| Arc::clone(&e.plugin))
    }

    /// Attached plugin names in attach order.
    pub fn names(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.metadata.name.clone()).collect()
    }

    /// Order in which [`initialize`](Self::initialize) visits plugins.
    pub fn initialization_order(&self) -> Vec<String> {
        self.names()
    }

    pub fn metadata(&self) -> Vec<PluginMetadata> {
        self.entries.lock().iter().map(|e| e.metadata.clone()).collect()
    }

    pub fn active(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.state.is_active())
            .map(|e| e.metadata.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn set_state(&self, name: &str, state: PluginState) {
        if let Some(entry) = self.entries.lock().iter_mut().find(|e| e.metadata.name == name) {
            entry.state = state;
        }
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("PluginManager")
            .field("config", &self.config)
            .field(
                "plugins",
                &entries
                    .iter()
                    .map(|e| (e.metadata.name.as_str(), e.state))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Runs one plugin call under a timeout, an optional cancellation token and
/// a panic guard.
async fn guarded<T, F>(
    plugin: &str,
    operation: &'static str,
    limit: Duration,
    cancel: Option<&CancellationToken>,
    call: F,
    on_error: impl FnOnce(String) -> PluginError,
) -> PluginResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let call = tokio::time::timeout(limit, AssertUnwindSafe(call).catch_unwind());
    let outcome = match cancel {
        Some(token) => match token.run_until_cancelled(call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(PluginError::Cancelled { plugin: plugin.to_string(), operation });
            }
        },
        None => call.await,
    };

    match outcome {
        Err(_) => {
            Err(PluginError::TimedOut { plugin: plugin.to_string(), operation, timeout: limit })
        }
        Ok(Err(panic)) => Err(PluginError::Panicked {
            plugin: plugin.to_string(),
            operation,
            message: panic_message(panic.as_ref()),
        }),
        Ok(Ok(result)) => result.map_err(|err| on_error(format!("{err:#}"))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn first_unsatisfied(pending: &[Candidate], attached: &HashSet<String>) -> Option<(usize, String)> {
    let batch: HashSet<&str> = pending.iter().map(|(_, m)| m.name.as_str()).collect();
    pending.iter().enumerate().find_map(|(index, (_, metadata))| {
        metadata
            .dependencies
            .iter()
            .find(|dep| !attached.contains(*dep) && !batch.contains(dep.as_str()))
            .map(|dep| (index, dep.clone()))
    })
}

/// Follows unplaced dependencies from `start` until a name repeats. Every
/// unplaced plugin has at least one unplaced dependency, so the walk always
/// closes a loop.
fn find_cycle(unplaced: &[Candidate], start: &str) -> Vec<String> {
    let by_name: HashMap<&str, &PluginMetadata> =
        unplaced.iter().map(|(_, m)| (m.name.as_str(), m)).collect();
    let mut path: Vec<&str> = vec![start];
    let mut current = start;

    loop {
        let next = by_name.get(current).and_then(|m| {
            m.dependencies.iter().find(|dep| by_name.contains_key(dep.as_str()))
        });
        let Some(next) = next else {
            return path.into_iter().map(str::to_string).collect();
        };
        if let Some(start_of_cycle) = path.iter().position(|name| *name == next.as_str()) {
            let mut cycle: Vec<String> =
                path[start_of_cycle..].iter().map(|s| s.to_string()).collect();
            cycle.push(next.clone());
            return cycle;
        }
        path.push(next.as_str());
        current = next.as_str();
    }
}

/// Outcome of [`PluginManager::attach_all`].
#[derive(Debug, Clone, Default)]
pub struct AttachReport {
    /// Attached names, in the order they were attached.
    pub attached: Vec<String>,
    pub rejected: Vec<PluginError>,
}

impl AttachReport {
    pub fn is_ok(&self) -> bool {
        self.rejected.is_empty()
    }

    pub fn rejection(&self, plugin: &str) -> Option<&PluginError> {
        self.rejected.iter().find(|e| e.plugin() == plugin)
    }
}

/// Per-plugin outcome of [`PluginManager::initialize`], in the order the
/// plugins were visited.
#[derive(Debug, Clone, Default)]
pub struct InitReport {
    results: Vec<(String, PluginResult<()>)>,
}

impl InitReport {
    pub fn get(&self, plugin: &str) -> Option<&PluginResult<()>> {
        self.results.iter().find(|(name, _)| name == plugin).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PluginResult<()>)> {
        self.results.iter().map(|(name, r)| (name.as_str(), r))
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.iter().filter(|(_, r)| r.is_ok()).map(|(name, _)| name).collect()
    }

    pub fn failures(&self) -> Vec<&PluginError> {
        self.results.iter().filter_map(|(_, r)| r.as_ref().err()).collect()
    }

    pub fn is_ok(&self) -> bool {
        self.results.iter().all(|(_, r)| r.is_ok())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Per-plugin outcome of one hook dispatch, in invocation order.
#[derive(Debug, Clone)]
pub struct HookResults {
    hook: Hook,
    results: Vec<(String, PluginResult<Value>)>,
}

impl HookResults {
    pub fn hook(&self) -> &Hook {
        &self.hook
    }

    pub fn get(&self, plugin: &str) -> Option<&PluginResult<Value>> {
        self.results.iter().find(|(name, _)| name == plugin).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PluginResult<Value>)> {
        self.results.iter().map(|(name, r)| (name.as_str(), r))
    }

    /// Names of the plugins that were invoked.
    pub fn invoked(&self) -> Vec<&str> {
        self.results.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn failures(&self) -> Vec<&PluginError> {
        self.results.iter().filter_map(|(_, r)| r.as_ref().err()).collect()
    }

    pub fn all_ok(&self) -> bool {
        self.results.iter().all(|(_, r)| r.is_ok())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Outcome of [`PluginManager::cleanup`].
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Every plugin that was detached, in cleanup order.
    pub detached: Vec<String>,
    pub errors: Vec<PluginError>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
