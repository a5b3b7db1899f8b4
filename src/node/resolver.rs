//! Node environment discovery.
//!
//! [`get_node_env`] runs the probe batch once and hands the normalized
//! [`NodeEnv`] to a callback. [`NodeEnvResolver`] builds on it to own the
//! current snapshot, coalescing overlapping refreshes into a single probe.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::oneshot;

use crate::config::{Platform, ProbeConfig, SettingsSource};
use crate::exec::{
    exec_cmd_with, CommandLine, Dispatch, ExecError, ExecOptions, ProcessHandle, ProcessListener,
    ProcessSpawner, TokioSpawner,
};
use crate::node::commands::{node_probe_batch, nvm_which, NVM_CURRENT_PATH};
use crate::node::{
    assert_node_path, normalize_node_result, NodeEnv, Notifier, ProbeOutput, ResolveError,
};
use crate::probe::ProbeBatch;

fn probe_options(config: &ProbeConfig) -> ExecOptions {
    let options = ExecOptions::new().timeout(config.timeout());
    match config.extra_path {
        Some(ref extra) => options.path(extra.clone()),
        None => options,
    }
}

/// Probe the node environment and pass the result to `on_done`.
///
/// Returns as soon as the probe process has started. `on_done` runs on the
/// task draining the probe's output, after the process exits.
///
/// # Errors
///
/// Returns an error if the probe process cannot be started.
pub fn get_node_env<F>(
    spawner: &dyn ProcessSpawner,
    config: &ProbeConfig,
    platform: Platform,
    on_done: F,
) -> Result<ProcessHandle, ExecError>
where
    F: FnOnce(NodeEnv) + Send + 'static,
{
    let batch = node_probe_batch(platform, config);
    let line = CommandLine::Shell(batch.shell_command());
    tracing::debug!(probes = batch.len(), command = %line, "Probing node environment");

    let on_done = Mutex::new(Some(on_done));
    let dispatch = Dispatch::new().on_finish(move |event| {
        let output = ProbeOutput::from_results(batch.parse(&event.bytes));
        let env = normalize_node_result(output);
        if let Some(done) = on_done.lock().expect("Mutex poisoned").take() {
            done(env);
        }
        Ok(())
    });

    exec_cmd_with(spawner, line, &probe_options(config), dispatch)
}

/// Owner of the current node environment snapshot.
pub struct NodeEnvResolver {
    spawner: Arc<dyn ProcessSpawner>,
    config: ProbeConfig,
    platform: Platform,
    snapshot: RwLock<Option<Arc<NodeEnv>>>,
    generation: AtomicU64,
    inflight: tokio::sync::Mutex<()>,
}

impl NodeEnvResolver {
    /// Create a resolver that spawns real processes.
    #[must_use]
    pub fn new(config: ProbeConfig) -> Self {
        Self::with_spawner(Arc::new(TokioSpawner), config)
    }

    /// Create a resolver with a custom spawner.
    #[must_use]
    pub fn with_spawner(spawner: Arc<dyn ProcessSpawner>, config: ProbeConfig) -> Self {
        Self {
            spawner,
            config,
            platform: Platform::current(),
            snapshot: RwLock::new(None),
            generation: AtomicU64::new(0),
            inflight: tokio::sync::Mutex::new(()),
        }
    }

    /// Probe as if running on `platform`.
    #[must_use]
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// The last resolved snapshot, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn current(&self) -> Option<Arc<NodeEnv>> {
        self.snapshot.read().expect("RwLock poisoned").clone()
    }

    /// Run one probe without touching the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Exec` if the probe cannot run or times out.
    pub async fn probe(&self) -> Result<NodeEnv, ResolveError> {
        let (tx, rx) = oneshot::channel();
        let handle = get_node_env(self.spawner.as_ref(), &self.config, self.platform, move |env| {
            let _ = tx.send(env);
        })?;
        handle.wait().await?;
        rx.await.map_err(|_| ResolveError::NoResult)
    }

    /// Probe and replace the snapshot.
    ///
    /// Callers that arrive while a probe is running wait for it and share its
    /// result instead of starting another.
    ///
    /// # Errors
    ///
    /// Returns the probe error; the previous snapshot is kept.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub async fn resolve(&self) -> Result<Arc<NodeEnv>, ResolveError> {
        let observed = self.generation.load(Ordering::Acquire);
        let _guard = self.inflight.lock().await;

        if self.generation.load(Ordering::Acquire) != observed {
            if let Some(env) = self.current() {
                tracing::debug!("Joined in-flight node environment probe");
                return Ok(env);
            }
        }

        let env = Arc::new(self.probe().await?);
        *self.snapshot.write().expect("RwLock poisoned") = Some(Arc::clone(&env));
        self.generation.fetch_add(1, Ordering::AcqRel);

        tracing::info!(
            node_path = ?env.node_path,
            nvm_default = ?env.nvm_default_path,
            system_node = ?env.system_node_path,
            "Node environment updated"
        );
        Ok(env)
    }

    /// The snapshot, probing first if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns the probe error when a probe was needed and failed.
    pub async fn get_or_resolve(&self) -> Result<Arc<NodeEnv>, ResolveError> {
        match self.current() {
            Some(env) => Ok(env),
            None => self.resolve().await,
        }
    }

    /// A usable node path from settings or the current snapshot.
    ///
    /// # Errors
    ///
    /// See [`assert_node_path`].
    pub fn assert_node_path(
        &self,
        sources: &[&dyn SettingsSource],
        notifier: &dyn Notifier,
    ) -> Result<PathBuf, ResolveError> {
        let env = self.current();
        assert_node_path(sources, env.as_deref(), self.platform, notifier)
    }

    /// The node path favoured by settings against the current snapshot.
    ///
    /// See [`NodeEnv::get_preferred`]. Unlike [`Self::assert_node_path`] this
    /// honours `prefer` and does not check that the path exists.
    #[must_use]
    pub fn preferred_node_path(&self, sources: &[&dyn SettingsSource]) -> Option<PathBuf> {
        self.current()
            .unwrap_or_default()
            .get_preferred(sources, self.platform)
    }

    /// The node that nvm selects for `dir` (honouring `.nvmrc`).
    ///
    /// When nvm runs but reports no usable path, the system node from the
    /// current snapshot is returned instead. Returns `None` when `dir` is
    /// not a directory, nvm is not installed, or the platform is Windows.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Exec` if the probe cannot run.
    pub async fn nvm_current_for_dir(&self, dir: &Path) -> Result<Option<PathBuf>, ResolveError> {
        if !dir.is_dir() || self.platform == Platform::Windows {
            return Ok(None);
        }
        let Some(script) = self.config.nvm_script() else {
            return Ok(None);
        };

        let batch =
            ProbeBatch::new(self.platform).probe(NVM_CURRENT_PATH, nvm_which(&script, "current"));
        let listener = ProcessListener::new();
        let handle = exec_cmd_with(
            self.spawner.as_ref(),
            CommandLine::Shell(batch.shell_command()),
            &probe_options(&self.config).working_dir(dir),
            Dispatch::new().listener(listener.clone()),
        )?;
        handle.wait().await?;

        let current = batch
            .parse(&listener.transcript())
            .take(NVM_CURRENT_PATH)
            .map(PathBuf::from)
            .filter(|p| p.exists())
            .or_else(|| {
                tracing::debug!(dir = %dir.display(), "nvm has no current node, using system");
                self.current().and_then(|env| env.system_node_path.clone())
            });
        tracing::debug!(dir = %dir.display(), ?current, "Resolved nvm current");
        Ok(current)
    }
}

impl fmt::Debug for NodeEnvResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeEnvResolver")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
